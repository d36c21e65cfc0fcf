use crate::dispatch::job::{BackendKind, Job, JobKind};

/// Estimates how many cost units a job takes on a given backend type.
///
/// Backends process their native media type at full speed. Priority jobs are
/// cheap on video backends and half speed on music backends; fully mismatched
/// work is slower still.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CostModel;

impl CostModel {
    pub fn new() -> Self {
        Self
    }

    pub fn multiplier(&self, backend: BackendKind, kind: JobKind) -> u64 {
        match (backend, kind) {
            (BackendKind::Video, JobKind::Video | JobKind::Priority) => 1,
            (BackendKind::Video, JobKind::Music) => 2,
            (BackendKind::Music, JobKind::Music) => 1,
            (BackendKind::Music, JobKind::Priority) => 2,
            (BackendKind::Music, JobKind::Video) => 3,
        }
    }

    /// Always positive for a valid job. Job sizes are capped, so this never
    /// reaches the saturation bound in practice.
    pub fn cost(&self, backend: BackendKind, job: &Job) -> u64 {
        self.multiplier(backend, job.kind())
            .saturating_mul(job.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::job::MAX_JOB_SIZE;

    fn job(kind: JobKind, size: u64) -> Job {
        Job::new(kind, size).unwrap()
    }

    #[test]
    fn rule_table() {
        let model = CostModel::new();
        let cases = [
            (BackendKind::Video, JobKind::Video, 1),
            (BackendKind::Video, JobKind::Priority, 1),
            (BackendKind::Video, JobKind::Music, 2),
            (BackendKind::Music, JobKind::Music, 1),
            (BackendKind::Music, JobKind::Priority, 2),
            (BackendKind::Music, JobKind::Video, 3),
        ];
        for (backend, kind, expected) in cases {
            assert_eq!(
                model.multiplier(backend, kind),
                expected,
                "{} job on {} backend",
                kind,
                backend
            );
        }
    }

    #[test]
    fn cost_is_linear_in_size() {
        let model = CostModel::new();
        for backend in BackendKind::ALL {
            for kind in JobKind::ALL {
                let unit = model.cost(backend, &job(kind, 1));
                for size in [1, 2, 7, 10, 1_000] {
                    assert_eq!(model.cost(backend, &job(kind, size)), unit * size);
                }
            }
        }
    }

    #[test]
    fn cost_is_always_positive() {
        let model = CostModel::new();
        for backend in BackendKind::ALL {
            for kind in JobKind::ALL {
                assert!(model.cost(backend, &job(kind, 1)) > 0);
            }
        }
    }

    #[test]
    fn largest_job_cost_is_exact() {
        let model = CostModel::new();
        let cost = model.cost(BackendKind::Music, &job(JobKind::Video, MAX_JOB_SIZE));
        assert_eq!(cost, 3 * MAX_JOB_SIZE);
        assert!(u32::try_from(cost).is_ok());
    }

    #[test]
    fn video_job_scenario() {
        let model = CostModel::new();
        let j = job(JobKind::Video, 10);
        assert_eq!(model.cost(BackendKind::Video, &j), 10);
        assert_eq!(model.cost(BackendKind::Music, &j), 30);
    }
}
