use clap::Parser;
use log::kv::{ToValue, Value};

#[derive(Parser, Debug, PartialEq)]
#[command(version, about = "Cross-source data composition engine")]
pub struct CliArgs {
    #[arg(short, long)]
    pub config: Option<String>,
    /// Refresh every configured connection once and exit.
    #[arg(long)]
    pub refresh_only: bool,
}

impl ToValue for CliArgs {
    fn to_value(&self) -> Value<'_> {
        Value::from_debug(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = CliArgs::parse_from(["self", "--config", "foo.toml"]);
        assert_eq!(
            args,
            CliArgs {
                config: Some("foo.toml".to_string()),
                refresh_only: false,
            }
        );
    }

    #[test]
    fn test_refresh_only_flag() {
        let args = CliArgs::parse_from(["self", "--refresh-only"]);
        assert!(args.refresh_only);
        assert_eq!(args.config, None);
    }
}
