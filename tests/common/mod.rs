pub mod pipeline_helpers;
