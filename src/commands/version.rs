use anyhow::Result;

pub fn execute() -> Result<()> {
    println!("gpustat version {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
