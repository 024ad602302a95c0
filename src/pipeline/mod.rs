mod config;
mod prompts;
mod tailor;
mod trace;

pub use config::{init_default_config, PipelineConfig};
pub use tailor::{
    parse_accepted, tailored_file_name, LineReport, Mode, PreviewLine, PreviewPayload,
    RerollOutcome, RerollRequest, TailorOutcome, TailorPipeline, TailorRequest, TailoredDocument,
};
