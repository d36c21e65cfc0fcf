use serde::{Deserialize, Serialize};

use crate::error::{BalancerError, Result};

/// Kind of work a client asks for.
///
/// New kinds get a tag and a row in the cost table; callers must not assume
/// the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum JobKind {
    Video,
    Music,
    Priority,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Video, JobKind::Music, JobKind::Priority];

    /// Single-byte wire tag.
    pub fn tag(self) -> u8 {
        match self {
            JobKind::Video => b'V',
            JobKind::Music => b'M',
            JobKind::Priority => b'P',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'V' => Some(JobKind::Video),
            b'M' => Some(JobKind::Music),
            b'P' => Some(JobKind::Priority),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Video => write!(f, "video"),
            JobKind::Music => write!(f, "music"),
            JobKind::Priority => write!(f, "priority"),
        }
    }
}

/// Media type a backend is specialised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum BackendKind {
    Video,
    Music,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Video, BackendKind::Music];
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Video => write!(f, "video"),
            BackendKind::Music => write!(f, "music"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = BalancerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v" | "video" => Ok(BackendKind::Video),
            "m" | "music" => Ok(BackendKind::Music),
            other => Err(BalancerError::Configuration(format!(
                "Invalid backend type {:?}, expected V or M",
                other
            ))),
        }
    }
}

/// Largest accepted job size. Three times this still fits a `u32` count of
/// cost units, and no realistic number of in-flight jobs can saturate a
/// backend's `u64` outstanding cost.
pub const MAX_JOB_SIZE: u64 = 1_000_000_000;

/// One unit of client-requested work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    kind: JobKind,
    size: u64,
}

impl Job {
    /// Size must be in `1..=MAX_JOB_SIZE`.
    pub fn new(kind: JobKind, size: u64) -> Result<Self> {
        if size == 0 {
            return Err(BalancerError::malformed("job size must be positive"));
        }
        if size > MAX_JOB_SIZE {
            return Err(BalancerError::malformed(format!(
                "job size {} exceeds {}",
                size, MAX_JOB_SIZE
            )));
        }
        Ok(Self { kind, size })
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_for_every_kind() {
        for kind in JobKind::ALL {
            assert_eq!(JobKind::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(JobKind::from_tag(b'X'), None);
        assert_eq!(JobKind::from_tag(b'v'), None);
    }

    #[test]
    fn zero_size_job_is_malformed() {
        let err = Job::new(JobKind::Video, 0).unwrap_err();
        assert!(matches!(err, BalancerError::MalformedRequest(_)));
    }

    #[test]
    fn oversized_job_is_malformed() {
        assert!(Job::new(JobKind::Music, MAX_JOB_SIZE).is_ok());
        let err = Job::new(JobKind::Music, MAX_JOB_SIZE + 1).unwrap_err();
        assert!(matches!(err, BalancerError::MalformedRequest(_)));
    }

    #[test]
    fn backend_kind_parses_short_and_long_names() {
        assert_eq!("V".parse::<BackendKind>().unwrap(), BackendKind::Video);
        assert_eq!("music".parse::<BackendKind>().unwrap(), BackendKind::Music);
        assert!(matches!(
            "P".parse::<BackendKind>(),
            Err(BalancerError::Configuration(_))
        ));
    }
}
