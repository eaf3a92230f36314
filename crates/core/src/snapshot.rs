// TrackRig - Track Test Rig Co-Simulation
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::dynamics::integrator::IntegratorDiagnostics;
use crate::track::{BodyPose, TrackVariant};
use crate::{ControlSignal, RigError, RigObserver, RigResult};
use nalgebra::Isometry3;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// What an observer sees at a render boundary.
#[derive(Serialize, Debug, Clone)]
pub struct RenderFrame {
    pub step: u64,
    pub frame: u64,
    pub time: f64,
    pub variant: TrackVariant,
    pub chassis: Isometry3<f64>,
    pub sprocket: BodyPose,
    pub idler: BodyPose,
    pub road_wheels: Vec<BodyPose>,
    pub controls: ControlSignal,
    pub diagnostics: Option<IntegratorDiagnostics>,
}

/// Writes render frames as `frame_NNN.json` (1-based) once the run is past
/// `start_step`.
#[derive(Debug)]
pub struct FrameSnapshotWriter {
    directory: PathBuf,
    start_step: u64,
    written: u64,
}

impl FrameSnapshotWriter {
    /// Creates `directory` if needed.
    pub fn new(directory: impl Into<PathBuf>, start_step: u64) -> RigResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| RigError::Resource {
            path: directory.clone(),
            source,
        })?;
        Ok(Self {
            directory,
            start_step,
            written: 0,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    fn write(&self, frame: &RenderFrame) -> RigResult<()> {
        let path = self.directory.join(format!("frame_{:03}.json", frame.frame + 1));
        let resource = |source| RigError::Resource {
            path: path.clone(),
            source,
        };
        let mut file = fs::File::create(&path).map_err(resource)?;
        let body = serde_json::to_vec_pretty(frame).map_err(|e| resource(e.into()))?;
        file.write_all(&body).map_err(resource)?;
        Ok(())
    }
}

impl RigObserver for FrameSnapshotWriter {
    fn on_render(&mut self, frame: &RenderFrame) -> RigResult<()> {
        if frame.step <= self.start_step {
            return Ok(());
        }
        self.write(frame)?;
        self.written += 1;
        Ok(())
    }
}
