mod common;

use dfm_core::AnyEmptyResult;
use dfm_core::DfmConfig;

#[test]
fn can_init() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let mut cmd = common::dfm_cmd();
	let assert = cmd
		.arg("init")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();
	assert
		.stdout(predicates::str::contains("Created dfm.toml"))
		.stdout(predicates::str::contains("Next steps"));

	let config_path = tmp.path().join("dfm.toml");
	assert!(config_path.exists());

	let config_content = std::fs::read_to_string(&config_path)?;
	assert!(config_content.contains("flavor = \"dfm\""));
	assert!(config_content.contains("[headings]"));
	assert!(config_content.contains("[exclude]"));

	let config = DfmConfig::load(tmp.path())?.ok_or("config not loaded")?;
	assert!(config.headings.ids);

	Ok(())
}

#[test]
fn init_does_not_overwrite() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	let config_path = tmp.path().join("dfm.toml");
	std::fs::write(&config_path, "flavor = \"gfm\"\n")?;

	let mut cmd = common::dfm_cmd();
	let assert = cmd
		.arg("init")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success();
	assert.stdout(predicates::str::contains("already exists"));

	let config_content = std::fs::read_to_string(&config_path)?;
	assert_eq!(config_content, "flavor = \"gfm\"\n");

	Ok(())
}

#[test]
fn init_respects_hidden_config() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::create_dir_all(tmp.path().join(".config"))?;
	std::fs::write(tmp.path().join(".config/dfm.toml"), "flavor = \"gfm\"\n")?;

	let mut cmd = common::dfm_cmd();
	cmd.arg("init")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout(predicates::str::contains("already exists"));

	assert!(!tmp.path().join("dfm.toml").exists());

	Ok(())
}
