use hugemem_region::RegionConfig;
use log::LevelFilter;

pub const USAGE: &str = "\
usage: hugemem-demo [--base <phys addr>] [--order <n>] [--verbose] [phys|dump|roundtrip|all]

  phys       open the device and print the region's physical address
  dump       map the region and print four words from it
  roundtrip  write through one client mapping, read back through another
  all        all of the above (default)";

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Phys,
    Dump,
    RoundTrip,
    All,
}

#[derive(Debug)]
pub struct Args {
    pub config: RegionConfig,
    pub level: LevelFilter,
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ArgsError {
    #[error("missing value for {0}")]
    MissingValue(&'static str),
    #[error("invalid number {0:?}")]
    BadNumber(String),
    #[error("unknown argument {0:?}")]
    Unknown(String),
    #[error("help requested")]
    Help,
}

impl Args {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            config: RegionConfig::default(),
            level: LevelFilter::Info,
            command: Command::All,
        };

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--base" => {
                    let value = args.next().ok_or(ArgsError::MissingValue("--base"))?;
                    parsed.config.physical_base = parse_u64(&value)?;
                }
                "--order" => {
                    let value = args.next().ok_or(ArgsError::MissingValue("--order"))?;
                    parsed.config.size_order = value
                        .parse()
                        .map_err(|_| ArgsError::BadNumber(value.clone()))?;
                }
                "-v" | "--verbose" => parsed.level = LevelFilter::Trace,
                "-h" | "--help" => return Err(ArgsError::Help),
                "phys" => parsed.command = Command::Phys,
                "dump" => parsed.command = Command::Dump,
                "roundtrip" => parsed.command = Command::RoundTrip,
                "all" => parsed.command = Command::All,
                _ => return Err(ArgsError::Unknown(arg)),
            }
        }

        Ok(parsed)
    }
}

/// Decimal, or hex with a `0x` prefix; `_` separators allowed.
fn parse_u64(value: &str) -> Result<u64, ArgsError> {
    let digits = value.replace('_', "");
    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => digits.parse(),
    };
    parsed.map_err(|_| ArgsError::BadNumber(value.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(args.iter().map(|s| (*s).to_owned()))
    }

    #[test]
    fn defaults_match_the_reservation() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.config, RegionConfig::default());
        assert_eq!(args.level, LevelFilter::Info);
        assert_eq!(args.command, Command::All);
    }

    #[test]
    fn overrides() {
        let args = parse(&["--base", "0x1_0000_0000", "--order", "4", "-v", "dump"]).unwrap();
        assert_eq!(args.config.physical_base, 0x1_0000_0000);
        assert_eq!(args.config.size_order, 4);
        assert_eq!(args.level, LevelFilter::Trace);
        assert_eq!(args.command, Command::Dump);

        assert_eq!(parse(&["--base", "4096"]).unwrap().config.physical_base, 4096);
    }

    #[test]
    fn bad_input() {
        assert_eq!(
            parse(&["--base"]).unwrap_err(),
            ArgsError::MissingValue("--base")
        );
        assert_eq!(
            parse(&["--order", "x"]).unwrap_err(),
            ArgsError::BadNumber("x".into())
        );
        assert_eq!(
            parse(&["frobnicate"]).unwrap_err(),
            ArgsError::Unknown("frobnicate".into())
        );
    }
}
