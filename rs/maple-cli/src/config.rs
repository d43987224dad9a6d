pub fn print_config(config: maple_native::Config) -> anyhow::Result<()> {
	print!("{}", config.to_toml()?);
	Ok(())
}
