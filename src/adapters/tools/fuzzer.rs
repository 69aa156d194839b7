//! Foundry property-fuzzing adapter.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::docker::DockerRunner;
use super::forge::{extract_json, parse_test_report};
use crate::domain::errors::DomainResult;
use crate::domain::models::{fuzz_routine_name, FuzzReport, ToolchainConfig, VersionTag};
use crate::domain::ports::FuzzExecutor;

const FUZZ_ROUTINE: &str = "testFuzz_DepositWithdraw";

/// Deposit/withdraw exercise shared by the fuzz harness and crash replays.
const EXERCISE: &str = r#"    function exercise(address user, uint256 amount) public {
        vm.assume(user != address(0));
        vm.assume(amount > 0 && amount < 100 ether);
        vm.deal(user, amount);

        vm.prank(user);
        (bool success, ) = address(target).call{value: amount}("");

        if (success) {
            vm.prank(user);
            (bool withdrawn, ) = address(target).call(abi.encodeWithSignature("withdraw()"));
            withdrawn;
        }
    }
"#;

/// Property harness deploying `Target` and exercising deposit/withdraw flows.
///
/// The import is project-root relative so the harness compiles wherever
/// it is staged later.
pub fn render_harness(import_path: &str, round_index: u32) -> String {
    format!(
        r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.20;

import "forge-std/Test.sol";
import "{import_path}";

contract FuzzTest{round_index} is Test {{
    Target public target;

    function setUp() public {{
        target = new Target();
    }}

{EXERCISE}
    function {FUZZ_ROUTINE}(address user, uint256 amount) public {{
        exercise(user, amount);
    }}
}}
"#
    )
}

/// Replay of one fuzz counterexample as a matrix case.
///
/// The routine succeeds while the exercise still breaks on the recorded
/// inputs, so it reads like any other exploit in regression.
pub fn render_reproducer(import_path: &str, round_index: u32, args_hex: &str) -> String {
    let routine = fuzz_routine_name(&VersionTag::for_round(round_index));
    format!(
        r#"// SPDX-License-Identifier: MIT
pragma solidity ^0.8.20;

import "forge-std/Test.sol";
import "{import_path}";

contract FuzzCrash{round_index} is Test {{
    Target public target;

    function setUp() public {{
        target = new Target();
    }}

{EXERCISE}
    function {routine}() public {{
        (address user, uint256 amount) = abi.decode(hex"{args_hex}", (address, uint256));
        (bool held, ) = address(this).call(abi.encodeWithSelector(this.exercise.selector, user, amount));
        assertFalse(held, "counterexample no longer breaks the target");
    }}
}}
"#
    )
}

/// Sum fuzz runs and count failed routines from a forge JSON report.
fn fuzz_stats(stdout: &str) -> Option<(u64, u64)> {
    let data: Value = serde_json::from_str(extract_json(stdout)?).ok()?;
    let mut runs = 0u64;
    let mut failures = 0u64;
    for file in data.as_object()?.values() {
        let Some(results) = file.get("test_results").and_then(Value::as_object) else {
            continue;
        };
        for result in results.values() {
            if result.get("status").and_then(Value::as_str) == Some("Failure") {
                failures += 1;
            }
            runs += result
                .pointer("/kind/Fuzz/runs")
                .and_then(Value::as_u64)
                .unwrap_or(0);
        }
    }
    Some((runs, failures))
}

/// ABI-encoded arguments of the first failing fuzz counterexample, as hex
/// without the selector.
fn counterexample_args(stdout: &str) -> Option<String> {
    let data: Value = serde_json::from_str(extract_json(stdout)?).ok()?;
    data.as_object()?
        .values()
        .filter_map(|file| file.get("test_results").and_then(Value::as_object))
        .flat_map(|results| results.values())
        .filter(|result| result.get("status").and_then(Value::as_str) == Some("Failure"))
        .find_map(|result| {
            result
                .pointer("/counterexample/Single/calldata")
                .or_else(|| result.pointer("/counterexample/calldata"))
                .and_then(Value::as_str)
        })
        .and_then(|calldata| calldata.strip_prefix("0x"))
        .and_then(|hex| hex.get(8..))
        .filter(|args| !args.is_empty() && args.len() % 2 == 0 && args.chars().all(|c| c.is_ascii_hexdigit()))
        .map(str::to_string)
}

pub struct FoundryFuzzer {
    docker: DockerRunner,
    image: String,
    remapping: String,
    fuzz_runs: u32,
}

impl FoundryFuzzer {
    pub fn new(docker: DockerRunner, toolchain: &ToolchainConfig) -> Self {
        Self {
            docker,
            image: toolchain.foundry_image.clone(),
            remapping: toolchain.forge_std_remapping.clone(),
            fuzz_runs: toolchain.fuzz_runs,
        }
    }
}

#[async_trait]
impl FuzzExecutor for FoundryFuzzer {
    fn name(&self) -> &'static str {
        "fuzzer"
    }

    async fn run(&self, workdir: &Path, source_path: &Path, round_index: u32) -> DomainResult<FuzzReport> {
        let import_path = source_path.strip_prefix(workdir).unwrap_or(source_path);
        let harness = render_harness(&import_path.to_string_lossy(), round_index);

        let relative = PathBuf::from("test")
            .join("fuzz")
            .join(format!("FuzzTest_Round{round_index}.t.sol"));
        let harness_path = workdir.join(&relative);
        if let Some(parent) = harness_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&harness_path, &harness).await?;

        let command = format!(
            "forge test --json --fuzz-runs {} --match-path '{}' --remappings {}",
            self.fuzz_runs,
            relative.display(),
            self.remapping
        );
        let output = self.docker.run(self.name(), &self.image, workdir, &command).await?;

        if let Err(e) = parse_test_report(&output) {
            tracing::warn!(round_index, error = %e, "Fuzz harness did not produce a report");
            return Ok(FuzzReport::tool_error(e.to_string()));
        }
        let Some((runs, failures)) = fuzz_stats(&output.stdout) else {
            return Ok(FuzzReport::tool_error("no fuzz statistics in forge output"));
        };

        tracing::debug!(round_index, runs, failures, "Fuzz pass finished");
        if failures == 0 {
            return Ok(FuzzReport::passed(runs));
        }

        let Some(args) = counterexample_args(&output.stdout) else {
            tracing::warn!(round_index, "Fuzz failure reported without a counterexample");
            return Ok(FuzzReport::crashed_unreproduced(runs, failures));
        };
        let reproducer = workdir.join(format!("test/fuzz/FuzzCrash_Round{round_index}.t.sol"));
        tokio::fs::write(&reproducer, render_reproducer(&import_path.to_string_lossy(), round_index, &args)).await?;
        Ok(FuzzReport::crashed(runs, failures, reproducer))
    }
}
