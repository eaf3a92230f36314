// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cosim::{LoopSummary, StepReport};
use crate::snapshot::RenderFrame;
use crate::{ControlSignal, RigObserver, RigResult};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxSteps,
    EndTime,
}

/// Host-side termination triggers: a step budget and a simulated end time.
#[derive(Debug, Clone, Default)]
pub struct StopConditions {
    max_steps: Option<u64>,
    end_time: Option<f64>,
    steps: u64,
    time: f64,
    reason: Option<StopReason>,
}

impl StopConditions {
    pub fn new(max_steps: Option<u64>, end_time: Option<f64>) -> Self {
        Self {
            max_steps,
            end_time,
            ..Default::default()
        }
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason
    }

    fn check(&mut self) {
        if self.reason.is_some() {
            return;
        }
        if self.max_steps.is_some_and(|max| self.steps >= max) {
            self.reason = Some(StopReason::MaxSteps);
        } else if self.end_time.is_some_and(|end| self.time >= end) {
            self.reason = Some(StopReason::EndTime);
        }
    }
}

impl RigObserver for StopConditions {
    fn keep_running(&mut self) -> bool {
        self.check();
        self.reason.is_none()
    }

    fn on_step_end(&mut self, report: &StepReport) {
        self.steps = report.step;
        self.time = report.time;
    }
}

/// Fans every callback out to several observers, in insertion order.
#[derive(Default)]
pub struct ObserverSet<'a> {
    observers: Vec<&'a mut dyn RigObserver>,
}

impl<'a> ObserverSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: &'a mut dyn RigObserver) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn push(&mut self, observer: &'a mut dyn RigObserver) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl RigObserver for ObserverSet<'_> {
    /// Polls every member so each can record its own stop reason.
    fn keep_running(&mut self) -> bool {
        self.observers
            .iter_mut()
            .fold(true, |running, o| o.keep_running() && running)
    }

    fn on_render(&mut self, frame: &RenderFrame) -> RigResult<()> {
        for o in self.observers.iter_mut() {
            o.on_render(frame)?;
        }
        Ok(())
    }

    fn synchronize(&mut self, time: f64, controls: ControlSignal) {
        for o in self.observers.iter_mut() {
            o.synchronize(time, controls);
        }
    }

    fn advance(&mut self, step: f64) {
        for o in self.observers.iter_mut() {
            o.advance(step);
        }
    }

    fn on_step_end(&mut self, report: &StepReport) {
        for o in self.observers.iter_mut() {
            o.on_step_end(report);
        }
    }

    fn on_loop_end(&mut self, summary: &LoopSummary) {
        for o in self.observers.iter_mut() {
            o.on_loop_end(summary);
        }
    }
}
