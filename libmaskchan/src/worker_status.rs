/// Stage of a board build, used to label progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildPhase {
    #[default]
    Scan,
    Mask,
    Channel,
    Finish,
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan => write!(f, "Scanning"),
            Self::Mask => write!(f, "Masks"),
            Self::Channel => write!(f, "Channels"),
            Self::Finish => write!(f, "Finishing"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildStatus {
    pub progress: f32,
    pub phase: BuildPhase,
    pub renderable: String,
}

impl BuildStatus {
    pub fn new(progress: f32, phase: BuildPhase, renderable: &str) -> Self {
        Self {
            progress,
            phase,
            renderable: renderable.to_string(),
        }
    }
}
