//! Integration tests of the agent binary.
mod common;

use std::time::Duration;

use anyhow::Context;
use common::{
    empty_temp_dir,
    run::{agent_command, run_agent, run_agent_tee, KillOnDrop},
};
use indoc::indoc;
use pretty_assertions::assert_eq;

const AGENT_BIN: &str = "tributary-agent";

#[test]
fn help() {
    let tmp_dir = empty_temp_dir("help").unwrap();
    let status = run_agent(AGENT_BIN, &["--help"], &tmp_dir).unwrap();
    assert!(status.success());
}

#[test]
fn kinds() -> anyhow::Result<()> {
    let tmp_dir = empty_temp_dir("kinds")?;
    let output = run_agent_tee(AGENT_BIN, &["kinds"], &tmp_dir)?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let expected = indoc! {"
        Available component kinds:
        - echo (stable)
        - metrics.generate (beta)
        - metrics.relabel (stable)
        - metrics.log (stable)
        - logs.log (beta)
    "};
    assert_eq!(stdout, expected);
    Ok(())
}

#[test]
fn args_bad_config_no_folder() -> anyhow::Result<()> {
    let tmp_dir = empty_temp_dir("args_bad_config_no_folder")?;
    let bad_conf = tmp_dir.join("zzzzz").join("config.toml");

    let bad_conf_filename = bad_conf.to_str().unwrap();
    let output = run_agent_tee(AGENT_BIN, &["--config", bad_conf_filename, "check"], &tmp_dir)?;
    assert!(
        !output.status.success(),
        "should fail because the config directory does not exist"
    );
    let stdout = String::from_utf8(output.stdout)?;
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stdout.contains(bad_conf_filename) || stderr.contains(bad_conf_filename));
    Ok(())
}

#[test]
fn args_bad_config_missing_file_no_default() -> anyhow::Result<()> {
    let tmp_dir = empty_temp_dir("args_bad_config_missing_file_no_default")?;
    let bad_conf = tmp_dir.join("zzzzz.toml");

    let bad_conf_filename = bad_conf.to_str().unwrap();
    let output = run_agent_tee(
        AGENT_BIN,
        &["--config", bad_conf_filename, "--no-default-config", "check"],
        &tmp_dir,
    )?;
    assert!(!output.status.success(), "should fail because the config does not exist");
    assert!(!bad_conf.exists(), "the default config should not be written");
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains(bad_conf_filename));
    Ok(())
}

#[test]
fn args_regen_config() -> anyhow::Result<()> {
    let tmp_dir = empty_temp_dir("args_regen_config")?;
    let conf = tmp_dir.join("config.toml");
    assert!(!conf.try_exists()?, "config file should not exist: {conf:?}");

    let conf_path_str = conf.to_str().unwrap();
    let output = run_agent_tee(AGENT_BIN, &["--config", conf_path_str, "config", "regen"], &tmp_dir)?;
    assert!(output.status.success(), "command should succeed");

    let conf_content =
        std::fs::read_to_string(&conf).with_context(|| format!("config should be generated to {conf:?}"))?;
    assert!(conf_content.starts_with("[runtime]\n"), "unexpected config:\n{conf_content}");
    assert!(conf_content.contains("min_stability = \"beta\""));
    assert!(conf_content.contains("[[component]]"));

    // the generated config is valid
    let output = run_agent_tee(AGENT_BIN, &["--config", conf_path_str, "check"], &tmp_dir)?;
    assert!(output.status.success(), "the default config should be valid");
    Ok(())
}

#[test]
fn check_valid_config() -> anyhow::Result<()> {
    let tmp_dir = empty_temp_dir("check_valid_config")?;
    let conf = tmp_dir.join("config.toml");
    std::fs::write(
        &conf,
        indoc! {r#"
            [[component]]
            kind = "echo"
            label = "a"
            arguments = { value = "${TRIBUTARY_TEST_VALUE}" }

            [[component]]
            kind = "echo"
            label = "b"
            arguments = { value = { ref = "echo.a", export = "value" } }
        "#},
    )?;

    let mut cmd = agent_command(AGENT_BIN, &["--config", conf.to_str().unwrap(), "check"], &tmp_dir)?;
    let output = cmd.env("TRIBUTARY_TEST_VALUE", "hello").output()?;
    let stdout = String::from_utf8(output.stdout)?;
    assert!(output.status.success(), "check should succeed: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout, "Configuration is valid: 2 component(s).\n");
    Ok(())
}

#[test]
fn check_missing_env_variable() -> anyhow::Result<()> {
    let tmp_dir = empty_temp_dir("check_missing_env_variable")?;
    let conf = tmp_dir.join("config.toml");
    std::fs::write(
        &conf,
        indoc! {r#"
            [[component]]
            kind = "echo"
            label = "a"
            arguments = { value = "${TRIBUTARY_TEST_UNDEFINED_VARIABLE}" }
        "#},
    )?;
    let output = run_agent_tee(AGENT_BIN, &["--config", conf.to_str().unwrap(), "check"], &tmp_dir)?;
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("TRIBUTARY_TEST_UNDEFINED_VARIABLE"), "stderr:\n{stderr}");
    Ok(())
}

#[test]
fn check_cycle() -> anyhow::Result<()> {
    let tmp_dir = empty_temp_dir("check_cycle")?;
    let conf = tmp_dir.join("config.toml");
    std::fs::write(
        &conf,
        indoc! {r#"
            [[component]]
            kind = "echo"
            label = "a"
            arguments = { value = { ref = "echo.b", export = "value" } }

            [[component]]
            kind = "echo"
            label = "b"
            arguments = { value = { ref = "echo.a", export = "value" } }
        "#},
    )?;
    let output = run_agent_tee(AGENT_BIN, &["--config", conf.to_str().unwrap(), "check"], &tmp_dir)?;
    assert!(!output.status.success(), "a cycle should be rejected");
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("dependency cycle between echo.a, echo.b"), "stderr:\n{stderr}");
    Ok(())
}

#[test]
fn min_stability_override() -> anyhow::Result<()> {
    let tmp_dir = empty_temp_dir("min_stability_override")?;
    let conf = tmp_dir.join("config.toml");
    std::fs::write(
        &conf,
        indoc! {r#"
            [[component]]
            kind = "logs.log"
            label = "out"
        "#},
    )?;
    let conf = conf.to_str().unwrap();

    // logs.log is beta, the default minimum is stable
    let output = run_agent_tee(AGENT_BIN, &["--config", conf, "check"], &tmp_dir)?;
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr)?;
    assert!(stderr.contains("minimum stability level is stable"), "stderr:\n{stderr}");

    let output = run_agent_tee(AGENT_BIN, &["--config", conf, "--min-stability", "beta", "check"], &tmp_dir)?;
    assert!(output.status.success());

    let output = run_agent_tee(
        AGENT_BIN,
        &["--config", conf, "--config-override", "runtime.min_stability = 'beta'", "check"],
        &tmp_dir,
    )?;
    assert!(output.status.success());
    Ok(())
}

#[test]
fn run_until_killed() -> anyhow::Result<()> {
    let tmp_dir = empty_temp_dir("run_until_killed")?;
    let conf = tmp_dir.join("config.toml");

    // the default config is written, then the agent runs until it is killed
    let mut cmd = agent_command(AGENT_BIN, &["--config", conf.to_str().unwrap()], &tmp_dir)?;
    let mut child = KillOnDrop(cmd.spawn()?);
    std::thread::sleep(Duration::from_secs(1));
    assert!(child.try_wait()?.is_none(), "the agent should still be running");
    assert!(conf.exists(), "the default config should have been written");
    Ok(())
}
