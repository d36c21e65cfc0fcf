use crate::dispatch::{Job, JobKind};
use crate::error::{BalancerError, Result};

/// Converts between client wire bytes and jobs.
pub trait JobCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Job>;
    fn encode(&self, job: &Job) -> Vec<u8>;
}

/// `<kind tag><decimal size>`, e.g. `V5` or `M12`. Trailing whitespace
/// (a newline from an interactive client) is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagCodec;

impl JobCodec for TagCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Job> {
        let bytes = bytes.trim_ascii_end();
        let (&tag, digits) = bytes
            .split_first()
            .ok_or_else(|| BalancerError::malformed("empty request"))?;

        let kind = JobKind::from_tag(tag).ok_or_else(|| {
            BalancerError::malformed(format!("unknown job kind {:?}", tag as char))
        })?;

        if digits.is_empty() {
            return Err(BalancerError::malformed("missing job size"));
        }
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(BalancerError::malformed(format!(
                "job size {:?} is not a decimal number",
                String::from_utf8_lossy(digits)
            )));
        }
        // All ASCII digits, so this is valid UTF-8; parse only fails on overflow.
        let size: u64 = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| BalancerError::malformed("job size out of range"))?;

        Job::new(kind, size)
    }

    fn encode(&self, job: &Job) -> Vec<u8> {
        let mut bytes = vec![job.kind().tag()];
        bytes.extend_from_slice(job.size().to_string().as_bytes());
        bytes
    }
}
