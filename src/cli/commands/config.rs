use crate::cli::OutputFormat;
use crate::config;

pub fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let redacted = config::config().redacted();
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&redacted)?),
        OutputFormat::Text => print!("{}", serde_yaml::to_string(&redacted)?),
    }
    Ok(())
}
