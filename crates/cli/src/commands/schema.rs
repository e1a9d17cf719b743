use anyhow::Result;
use runall_core::configs::run::RunConfig;

pub fn execute() -> Result<()> {
    let schema = schemars::schema_for!(RunConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
