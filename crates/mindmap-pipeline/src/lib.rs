pub mod enrichment;
pub mod event;
pub mod mock;
pub mod options;
pub mod orchestrator;
pub mod prompts;
pub mod render;
pub mod stage;
pub mod usage;

pub mod prelude {
    pub use crate::enrichment::{Enricher, Enrichment, ReferenceFetcher, Snippet};
    pub use crate::event::PipelineEvent;
    pub use crate::options::{DetailLevel, PipelineOptions};
    pub use crate::orchestrator::{Pipeline, PipelineOutput};
    pub use crate::stage::Stage;
    pub use crate::usage::UsageReport;
}
