pub mod matcher;
pub mod processor;
pub mod report;
pub mod router;

pub use matcher::{Assignment, AssignmentResult, BarcodeMatcher};
pub use processor::{check_outputs, DemuxPipeline};
pub use report::RunSummary;
pub use router::{route, Buckets, SampleBucket};
