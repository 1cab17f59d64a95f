// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::*;
use crate::config::SettingsPatch;
use crate::traits::{AgentViews, Capabilities, InputEvent, Width};
use async_trait::async_trait;
use std::sync::atomic::AtomicUsize;

#[derive(Default)]
struct Scripted {
    name: &'static str,
    caps: Capabilities,
    reads: Option<Width>,
    writes: Option<Width>,
    priority: f64,
    fill: Vec<f32>,
    /// `None` makes the agent fail.
    agent_result: Option<bool>,
    hang: bool,
    think_for: Option<Duration>,
    panic_on_read: bool,
    settings: Option<SettingsPatch>,
    script: Option<String>,
    inits: AtomicUsize,
    deinits: AtomicUsize,
    agent_calls: AtomicUsize,
    written: Mutex<Vec<Vec<f32>>>,
}

#[async_trait]
impl Interface for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn reads(&self) -> Option<Width> {
        self.reads
    }

    fn writes(&self) -> Option<Width> {
        self.writes
    }

    fn priority(&self) -> f64 {
        self.priority
    }

    fn settings(&self) -> Option<SettingsPatch> {
        self.settings.clone()
    }

    fn injected_script(&self) -> Option<String> {
        self.script.clone()
    }

    async fn init(&self, _stream: &Stream) -> anyhow::Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn deinit(&self, _stream: &Stream) -> anyhow::Result<()> {
        self.deinits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, _stream: &Stream, obs: View, end: End) -> anyhow::Result<()> {
        if self.panic_on_read {
            panic!("reader exploded");
        }
        obs.copy_from(&self.fill);
        end.end().await;
        Ok(())
    }

    async fn write(&self, _stream: &Stream, _pred: View, act: View) -> anyhow::Result<()> {
        lock(&self.written).push(act.to_vec());
        Ok(())
    }

    async fn agent(&self, _stream: &Stream, _views: AgentViews) -> anyhow::Result<bool> {
        self.agent_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(pause) = self.think_for {
            tokio::time::sleep(pause).await;
        }
        self.agent_result
            .ok_or_else(|| anyhow::anyhow!("agent broke"))
    }
}

fn reader(name: &'static str, width: usize) -> Scripted {
    Scripted {
        name,
        caps: Capabilities {
            reads: true,
            ..Default::default()
        },
        reads: Some(Width::Fixed(width)),
        ..Default::default()
    }
}

fn agent(name: &'static str, result: Option<bool>) -> Scripted {
    Scripted {
        name,
        caps: Capabilities {
            agent: true,
            lifecycle: true,
            ..Default::default()
        },
        agent_result: result,
        ..Default::default()
    }
}

fn as_dyn(p: &Arc<Scripted>) -> Arc<dyn Interface> {
    Arc::clone(p) as Arc<dyn Interface>
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition never became true");
}

#[derive(Default)]
struct FlakyRelauncher {
    failures: usize,
    calls: AtomicUsize,
    teardowns: AtomicUsize,
}

#[async_trait]
impl Relauncher for FlakyRelauncher {
    async fn relaunch(&self, _stream: &Stream) -> anyhow::Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            anyhow::bail!("launch {} failed", n);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingDriver {
    injected: Mutex<Vec<Vec<String>>>,
    visited: Mutex<Vec<String>>,
}

#[async_trait]
impl PageDriver for RecordingDriver {
    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        lock(&self.visited).push(url.to_string());
        Ok(())
    }

    async fn dispatch(&self, _event: InputEvent) -> anyhow::Result<()> {
        Ok(())
    }

    async fn inject_scripts(&self, scripts: &[String]) -> anyhow::Result<()> {
        lock(&self.injected).push(scripts.to_vec());
        Ok(())
    }
}

#[tokio::test]
async fn test_read_then_write_end_to_end() {
    let scripted = Arc::new(Scripted {
        name: "scripted",
        caps: Capabilities {
            reads: true,
            writes: true,
            ..Default::default()
        },
        reads: Some(Width::Fixed(2)),
        writes: Some(Width::Fixed(1)),
        fill: vec![0.5, f32::NAN],
        ..Default::default()
    });
    let stream = StreamBuilder::new()
        .interfaces(vec![as_dyn(&scripted)])
        .open()
        .await
        .unwrap();
    assert_eq!(stream.state(), StreamState::Ready);
    assert_eq!((stream.reads(), stream.writes()), (2, 1));

    let obs = stream.read().await.unwrap();
    assert_eq!(obs[0], 0.5);
    assert!(obs[1].is_nan());

    stream.write(&[0.3]).await.unwrap();
    assert_eq!(*lock(&scripted.written), vec![vec![0.3]]);

    assert!(matches!(
        stream.write(&[0.3, 0.1]).await,
        Err(StreamError::LengthMismatch { expected: 1, actual: 2 })
    ));
    stream.close().await;
}

#[tokio::test]
async fn test_priority_orders_bindings_stably() {
    let scripted: Vec<Arc<Scripted>> = [("a", 2.0), ("b", 0.0), ("c", 2.0), ("d", -1.0)]
        .into_iter()
        .map(|(name, priority)| {
            Arc::new(Scripted {
                priority,
                ..reader(name, 1)
            })
        })
        .collect();
    let stream = StreamBuilder::new()
        .interfaces(scripted.iter().map(as_dyn).collect())
        .open()
        .await
        .unwrap();

    let order: Vec<String> = stream.bindings().into_iter().map(|b| b.name).collect();
    assert_eq!(order, vec!["a", "c", "b", "d"]);
    let offsets: Vec<usize> = stream.bindings().iter().map(|b| b.obs.offset()).collect();
    assert_eq!(offsets, vec![0, 1, 2, 3]);
    stream.close().await;
}

#[tokio::test]
async fn test_declared_widths_count_without_matching_hooks() {
    let r = Arc::new(reader("r", 2));
    let w = Arc::new(Scripted {
        name: "w",
        caps: Capabilities {
            writes: true,
            ..Default::default()
        },
        reads: Some(Width::Fixed(3)),
        writes: Some(Width::Fixed(1)),
        ..Default::default()
    });
    let stream = StreamBuilder::new()
        .interfaces(vec![as_dyn(&r), as_dyn(&w)])
        .open()
        .await
        .unwrap();

    assert_eq!((stream.reads(), stream.writes()), (5, 1));
    let bindings = stream.bindings();
    let writer = bindings.iter().find(|b| b.name == "w").unwrap();
    assert_eq!((writer.pred.offset(), writer.pred.len()), (2, 3));
    assert_eq!((writer.act.offset(), writer.act.len()), (0, 1));
    stream.close().await;
}

#[tokio::test]
async fn test_deferred_groups_flatten_and_dedupe() {
    let a = Arc::new(reader("a", 1));
    let b = Arc::new(reader("b", 2));
    let later = {
        let (a, b) = (as_dyn(&a), as_dyn(&b));
        InterfaceTree::deferred(async move { vec![b, a].into() })
    };
    let stream = StreamBuilder::new()
        .interface(as_dyn(&a))
        .interface(later)
        .open()
        .await
        .unwrap();

    let names: Vec<String> = stream.bindings().into_iter().map(|b| b.name).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(stream.reads(), 3);
    stream.close().await;
}

#[tokio::test]
async fn test_relink_runs_lifecycle_and_merges_settings() {
    let driver = Arc::new(RecordingDriver::default());
    let first = Arc::new(Scripted {
        script: Some("one()".into()),
        caps: Capabilities {
            lifecycle: true,
            injected_script: true,
            ..Default::default()
        },
        ..reader("first", 1)
    });
    let second = Arc::new(Scripted {
        settings: Some(SettingsPatch {
            homepage: Some("https://example.com".into()),
            ..Default::default()
        }),
        caps: Capabilities {
            lifecycle: true,
            ..Default::default()
        },
        ..reader("second", 1)
    });

    let stream = StreamBuilder::new()
        .page_driver(driver.clone())
        .interfaces(vec![as_dyn(&first)])
        .open()
        .await
        .unwrap();
    let id_before = stream.layout_id();
    let old_obs = stream.observations();

    stream
        .relink(vec![as_dyn(&first), as_dyn(&second)])
        .await
        .unwrap();
    assert_eq!(first.inits.load(Ordering::SeqCst), 1);
    assert_eq!(second.inits.load(Ordering::SeqCst), 1);
    assert_eq!(stream.settings().homepage, "https://example.com");
    assert!(old_obs.is_stale());
    assert_ne!(stream.layout_id(), id_before);

    // Same set again: no lifecycle calls, but a fresh layout.
    let id_same = stream.layout_id();
    stream
        .relink(vec![as_dyn(&first), as_dyn(&second)])
        .await
        .unwrap();
    assert_eq!(first.inits.load(Ordering::SeqCst), 1);
    assert_ne!(stream.layout_id(), id_same);

    stream.relink(vec![as_dyn(&second)]).await.unwrap();
    assert_eq!(first.deinits.load(Ordering::SeqCst), 1);
    assert_eq!(second.deinits.load(Ordering::SeqCst), 0);

    assert_eq!(
        *lock(&driver.injected),
        vec![vec!["one()".to_string()], Vec::<String>::new()]
    );
    stream.close().await;
    assert_eq!(second.deinits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resize_is_idempotent_and_keeps_prefix() {
    let rest = Arc::new(Scripted {
        reads: Some(Width::Remaining),
        ..reader("rest", 0)
    });
    let fixed = Arc::new(Scripted {
        priority: 1.0,
        ..reader("fixed", 2)
    });
    let stream = StreamBuilder::new()
        .interfaces(vec![as_dyn(&rest), as_dyn(&fixed)])
        .open()
        .await
        .unwrap();
    assert_eq!(stream.reads(), 2);
    stream.observations().copy_from(&[1.0, 2.0]);

    stream.resize(5, 0).await.unwrap();
    let id = stream.layout_id();
    let obs = stream.observations().to_vec();
    assert_eq!(&obs[..2], &[1.0, 2.0]);
    assert!(obs[2..].iter().all(|v| v.is_nan()));
    let rest_binding = stream
        .bindings()
        .into_iter()
        .find(|b| b.name == "rest")
        .unwrap();
    assert_eq!((rest_binding.obs.offset(), rest_binding.obs.len()), (2, 3));

    stream.resize(5, 0).await.unwrap();
    assert_eq!(stream.layout_id(), id);

    assert!(matches!(
        stream.resize(1, 0).await,
        Err(StreamError::ResizeTooSmall { buffer: "reads", requested: 1, fixed: 2 })
    ));
    assert_eq!(stream.reads(), 5);
    stream.close().await;
}

#[tokio::test]
async fn test_loop_survives_a_panicking_reader() {
    let thinker = Arc::new(agent("thinker", Some(true)));
    let bomb = Arc::new(Scripted {
        panic_on_read: true,
        ..reader("bomb", 1)
    });
    let settings = StreamSettings {
        simultaneous_steps: 1,
        ..Default::default()
    };
    let stream = StreamBuilder::new()
        .settings(settings)
        .interfaces(vec![as_dyn(&thinker), as_dyn(&bomb)])
        .open()
        .await
        .unwrap();

    wait_until(|| thinker.agent_calls.load(Ordering::SeqCst) >= 5).await;
    assert!(stream.steps_in_flight() >= 1);
    assert_eq!(stream.bindings().len(), 2);
    stream.close().await;
}

#[tokio::test]
async fn test_overlapping_steps_respect_the_cap() {
    let slow = Arc::new(Scripted {
        think_for: Some(Duration::from_millis(10)),
        ..agent("slow", Some(true))
    });
    let settings = StreamSettings {
        simultaneous_steps: 2,
        ..Default::default()
    };
    let stream = StreamBuilder::new()
        .settings(settings)
        .interfaces(vec![as_dyn(&slow)])
        .open()
        .await
        .unwrap();

    let mut most = 0;
    tokio::time::timeout(Duration::from_secs(5), async {
        while slow.agent_calls.load(Ordering::SeqCst) < 12 {
            let now = stream.steps_in_flight();
            assert!(now <= 2, "{} steps in flight", now);
            most = most.max(now);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("agent stopped being called");
    assert_eq!(most, 2);
    stream.close().await;
}

#[tokio::test]
async fn test_agents_not_returning_true_are_unlinked() {
    let quitter = Arc::new(agent("quitter", Some(false)));
    let broken = Arc::new(agent("broken", None));
    let keeper = Arc::new(agent("keeper", Some(true)));
    let stream = StreamBuilder::new()
        .interfaces(vec![as_dyn(&quitter), as_dyn(&broken), as_dyn(&keeper)])
        .open()
        .await
        .unwrap();

    wait_until(|| stream.bindings().len() == 1).await;
    assert_eq!(stream.bindings()[0].name, "keeper");
    assert_eq!(stream.interfaces().len(), 1);
    assert_eq!(quitter.deinits.load(Ordering::SeqCst), 1);
    assert_eq!(broken.deinits.load(Ordering::SeqCst), 1);

    wait_until(|| keeper.agent_calls.load(Ordering::SeqCst) >= 3).await;
    stream.close().await;
}

#[tokio::test]
async fn test_loop_stops_when_last_agent_leaves_and_restarts_on_relink() {
    let once = Arc::new(agent("once", Some(false)));
    let stream = StreamBuilder::new()
        .interfaces(vec![as_dyn(&once)])
        .open()
        .await
        .unwrap();

    wait_until(|| stream.bindings().is_empty() && stream.steps_in_flight() == 0).await;

    let again = Arc::new(agent("again", Some(true)));
    stream.relink(vec![as_dyn(&again)]).await.unwrap();
    wait_until(|| again.agent_calls.load(Ordering::SeqCst) >= 2).await;
    stream.close().await;
}

#[tokio::test]
async fn test_closed_stream_rejects_operations() {
    let scripted = Arc::new(Scripted {
        caps: Capabilities {
            reads: true,
            lifecycle: true,
            ..Default::default()
        },
        ..reader("scripted", 1)
    });
    let stream = StreamBuilder::new()
        .interfaces(vec![as_dyn(&scripted)])
        .open()
        .await
        .unwrap();

    stream.close().await;
    stream.close().await;
    assert_eq!(stream.state(), StreamState::Closed);
    assert_eq!(scripted.deinits.load(Ordering::SeqCst), 1);
    assert!(matches!(stream.read().await, Err(StreamError::Closed)));
    assert!(matches!(stream.write(&[]).await, Err(StreamError::Closed)));
    assert!(matches!(
        stream.relink(InterfaceTree::empty()).await,
        Err(StreamError::Closed)
    ));
    assert!(matches!(stream.resize(1, 1).await, Err(StreamError::Closed)));
}

#[tokio::test]
async fn test_open_retries_relaunch() {
    let relauncher = Arc::new(FlakyRelauncher {
        failures: 2,
        ..Default::default()
    });
    let settings = StreamSettings {
        max_relaunch_attempts: 3,
        ..Default::default()
    };
    let stream = StreamBuilder::new()
        .settings(settings)
        .relauncher(relauncher.clone())
        .open()
        .await
        .unwrap();
    assert_eq!(relauncher.calls.load(Ordering::SeqCst), 3);
    assert_eq!(relauncher.teardowns.load(Ordering::SeqCst), 0);
    stream.close().await;
    assert_eq!(relauncher.teardowns.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_relaunch_returns_to_homepage() {
    let relauncher = Arc::new(FlakyRelauncher {
        failures: 1,
        ..Default::default()
    });
    let driver = Arc::new(RecordingDriver::default());
    let settings = StreamSettings {
        homepage: "https://example.com/start".into(),
        ..Default::default()
    };
    let stream = StreamBuilder::new()
        .settings(settings)
        .relauncher(relauncher.clone())
        .page_driver(driver.clone())
        .open()
        .await
        .unwrap();
    assert_eq!(*lock(&driver.visited), vec!["https://example.com/start"]);
    stream.close().await;
}

#[tokio::test]
async fn test_open_fails_after_exhausting_relaunches() {
    let relauncher = Arc::new(FlakyRelauncher {
        failures: usize::MAX,
        ..Default::default()
    });
    let settings = StreamSettings {
        max_relaunch_attempts: 2,
        ..Default::default()
    };
    let result = StreamBuilder::new()
        .settings(settings)
        .relauncher(relauncher.clone())
        .open()
        .await;

    match result {
        Err(StreamError::RelaunchFailed { attempts, source }) => {
            assert_eq!(attempts, 2);
            assert_eq!(source.to_string(), "launch 2 failed");
        }
        other => panic!("expected RelaunchFailed, got {:?}", other),
    }
    assert_eq!(relauncher.calls.load(Ordering::SeqCst), 2);
    assert!(relauncher.teardowns.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_relaunches_a_stalled_stream() {
    let relauncher = Arc::new(FlakyRelauncher::default());
    let stuck = Arc::new(Scripted {
        hang: true,
        ..agent("stuck", Some(true))
    });
    let settings = StreamSettings {
        simultaneous_steps: 1,
        watchdog_interval_ms: 100,
        stall_timeout_ms: 50,
        ..Default::default()
    };
    let stream = StreamBuilder::new()
        .settings(settings)
        .relauncher(relauncher.clone())
        .interfaces(vec![as_dyn(&stuck)])
        .open()
        .await
        .unwrap();
    assert_eq!(relauncher.calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(relauncher.calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(stuck.agent_calls.load(Ordering::SeqCst), 1);
    stream.close().await;
}
