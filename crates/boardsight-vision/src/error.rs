use boardsight_core::ScreenRect;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("degenerate region {0:?}: {1}")]
    DegenerateRegion(ScreenRect, &'static str),
    #[error("region {region:?} is not inside the captured frame {frame:?}")]
    RegionOutsideFrame {
        region: ScreenRect,
        frame: ScreenRect,
    },
    #[error("no sample frames supplied")]
    NoSampleFrames,
    #[error("sample frames do not cover the same screen area")]
    FrameSizeMismatch,
    #[error("board orientation unresolved: {reason}")]
    OrientationUnresolved { reason: String },
    #[error("invalid calibrated grid: {0}")]
    InvalidGrid(String),
}
