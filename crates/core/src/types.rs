/// Job identifiers as issued by the job source.
pub type JobId = i64;
