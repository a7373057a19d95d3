// src/pose_track.rs
//
// Pose input. The estimation model itself lives outside this crate; a
// PoseTrack replays poses that were estimated ahead of time.

use crate::types::{Frame, Pose};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Produces the pose for one frame. `Ok(None)` means no person was found;
/// an `Err` is logged by the caller and treated the same way.
pub trait PoseEstimator: Send {
    fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>>;
}

impl<F> PoseEstimator for F
where
    F: FnMut(&Frame) -> Result<Option<Pose>> + Send,
{
    fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>> {
        self(frame)
    }
}

/// One line of a `.poses.jsonl` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub frame: u64,
    #[serde(default)]
    pub landmarks: Option<Pose>,
}

/// Poses keyed by frame index. Frames without a record have no pose.
#[derive(Debug, Clone, Default)]
pub struct PoseTrack {
    poses: BTreeMap<u64, Pose>,
    empty_records: usize,
}

impl PoseTrack {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read pose track {}", path.display()))?;
        let track = Self::parse(&contents)
            .with_context(|| format!("invalid pose track {}", path.display()))?;
        info!(
            "Loaded pose track {}: {} poses, {} empty frames",
            path.display(),
            track.poses.len(),
            track.empty_records
        );
        Ok(track)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut records = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: PoseRecord =
                serde_json::from_str(line).with_context(|| format!("line {}", i + 1))?;
            records.push(record);
        }
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: impl IntoIterator<Item = PoseRecord>) -> Self {
        let mut track = Self::default();
        for record in records {
            match record.landmarks {
                Some(pose) => {
                    track.poses.insert(record.frame, pose);
                }
                None => {
                    track.poses.remove(&record.frame);
                    track.empty_records += 1;
                }
            }
        }
        track
    }

    pub fn get(&self, frame: u64) -> Option<&Pose> {
        self.poses.get(&frame)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

impl PoseEstimator for PoseTrack {
    fn estimate(&mut self, frame: &Frame) -> Result<Option<Pose>> {
        Ok(self.poses.get(&frame.index).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Joint;
    use image::RgbImage;

    const TRACK: &str = r#"
{"frame": 0, "landmarks": {"left_knee": {"x": 0.4, "y": 0.6, "visibility": 0.9}}}
{"frame": 1, "landmarks": null}

{"frame": 3, "landmarks": {"nose": {"x": 0.5, "y": 0.1, "z": -0.2, "visibility": 0.99}}}
"#;

    #[test]
    fn test_parse_and_lookup() {
        let mut track = PoseTrack::parse(TRACK).unwrap();
        assert_eq!(track.len(), 2);

        let frame = |i| Frame::new(i, 0.0, RgbImage::new(1, 1));
        let pose = track.estimate(&frame(0)).unwrap().unwrap();
        assert_eq!(pose.get(Joint::LeftKnee).unwrap().z, 0.0);
        assert!(track.estimate(&frame(1)).unwrap().is_none());
        assert!(track.estimate(&frame(2)).unwrap().is_none());
        assert!(track.estimate(&frame(3)).unwrap().is_some());
    }

    #[test]
    fn test_bad_line_reports_position() {
        let err = PoseTrack::parse("{\"frame\": 0}\nnot json").unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn test_unknown_joint_is_rejected() {
        let line = r#"{"frame": 0, "landmarks": {"left_toe": {"x": 0, "y": 0, "visibility": 1}}}"#;
        assert!(PoseTrack::parse(line).is_err());
    }

    #[test]
    fn test_closure_estimator() {
        let mut calls = 0;
        let mut estimator = |_: &Frame| -> Result<Option<Pose>> {
            calls += 1;
            Ok(None)
        };
        let frame = Frame::new(0, 0.0, RgbImage::new(1, 1));
        assert!(estimator.estimate(&frame).unwrap().is_none());
        drop(estimator);
        assert_eq!(calls, 1);
    }
}
