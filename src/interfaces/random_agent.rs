// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::stream::Stream;
use crate::traits::{AgentViews, Capabilities, Interface};
use crate::utils::lock;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Mutex;

/// Position, speed and acceleration of one meandering action.
const ORDERS: usize = 3;

/// Puts random `-1..1` actions into the whole action buffer every step.
///
/// With a non-zero `relative` each action meanders instead of jumping: a random
/// derivative is nudged by up to `relative` and integrated down into the value.
pub struct RandomAgent {
    relative: f32,
    derivatives: Mutex<Vec<[f32; ORDERS]>>,
}

impl RandomAgent {
    pub fn new(relative: f32) -> Self {
        Self {
            relative,
            derivatives: Mutex::new(Vec::new()),
        }
    }
}

fn meander<R: Rng>(rng: &mut R, d: &mut [f32; ORDERS], x: f32, relative: f32, count: usize) -> f32 {
    d[0] = if x.is_finite() { x } else { 0.0 };
    let order = rng.gen_range(0..ORDERS);
    d[order] = (d[order] + rng.gen_range(-1.0..1.0) * relative) * 0.9;
    if rng.gen::<f32>() < 1.0 / count.max(1) as f32 {
        d[order] = rng.gen_range(-1.0..1.0);
    }
    for j in (2..=ORDERS).rev() {
        let mut speed = d[j - 1];
        let mut pos = d[j - 2] + speed;
        if pos < -1.0 && speed < 0.0 {
            speed = -speed / 2.0;
            pos = -1.0;
        }
        if pos > 1.0 && speed > 0.0 {
            speed = -speed / 2.0;
            pos = 1.0;
        }
        d[j - 1] = speed;
        d[j - 2] = pos.clamp(-1.0, 1.0);
    }
    d[0]
}

#[async_trait]
impl Interface for RandomAgent {
    fn name(&self) -> &str {
        "random_agent"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            agent: true,
            ..Capabilities::default()
        }
    }

    fn priority(&self) -> f64 {
        1.0
    }

    async fn agent(&self, _stream: &Stream, views: AgentViews) -> anyhow::Result<bool> {
        let mut rng = rand::thread_rng();
        if self.relative == 0.0 {
            views
                .act
                .with_mut(|act| act.iter_mut().for_each(|a| *a = rng.gen_range(-1.0..1.0)));
            return Ok(true);
        }
        let mut derivatives = lock(&self.derivatives);
        views.act.with_mut(|act| {
            if derivatives.len() < act.len() {
                derivatives.resize(act.len(), [0.0; ORDERS]);
            }
            let count = act.len();
            for (a, d) in act.iter_mut().zip(derivatives.iter_mut()) {
                *a = meander(&mut rng, d, *a, self.relative, count);
            }
        });
        Ok(true)
    }
}
