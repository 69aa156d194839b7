//! Tool adapters implementing the analysis and generation ports.
//!
//! - `docker`: container execution shared by the Foundry and Slither adapters
//! - `forge`: `forge test --json` parsing and the regression runner
//! - `slither`, `fuzzer`: discovery tools
//! - `llm`: exploit and patch generators
//! - `mock`: scripted fakes

pub mod docker;
pub mod forge;
pub mod fuzzer;
pub mod llm;
pub mod mock;
pub mod slither;

pub use docker::{DockerRunner, ProcessOutput};
pub use forge::{ForgeOutputError, ForgeRegressionRunner};
pub use fuzzer::FoundryFuzzer;
pub use llm::{ChatClient, LlmError, LlmExploitGenerator, LlmPatchGenerator};
pub use mock::{
    regression_report, MockExploitGenerator, MockFuzzExecutor, MockPatchGenerator, MockRegressionRunner,
    MockStaticAnalyzer, MockStep, PatchCall,
};
pub use slither::SlitherAnalyzer;
