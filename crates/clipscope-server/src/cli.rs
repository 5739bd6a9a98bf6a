use clap::Parser;
use clipscope_models::DeviceSpec;

#[derive(Parser, Debug, Default)]
#[command(name = "clipscope-server")]
#[command(
    author,
    version,
    about = "Compare fine-tuned CLIP checkpoints on the same image"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CLIPSCOPE_CONFIG", default_value = "clipscope.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long, env = "CLIPSCOPE_LISTEN")]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "CLIPSCOPE_PORT")]
    pub port: Option<u16>,

    /// Inference device: auto, cpu, cuda[:N] or metal[:N]
    #[arg(short, long, env = "CLIPSCOPE_DEVICE", value_parser = parse_device)]
    pub device: Option<DeviceSpec>,

    /// Use the deterministic mock backend instead of CLIP
    #[arg(long)]
    pub mock: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_device(s: &str) -> Result<DeviceSpec, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::parse_from([
            "clipscope-server",
            "--config",
            "custom.yaml",
            "-P",
            "9000",
            "--device",
            "cuda:1",
            "--mock",
        ]);

        assert_eq!(cli.config, "custom.yaml");
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.device, Some(DeviceSpec::Cuda { index: Some(1) }));
        assert!(cli.mock);
        assert!(cli.listen.is_none());
    }

    #[test]
    fn test_rejects_bad_device() {
        let result = Cli::try_parse_from(["clipscope-server", "--device", "tpu"]);
        assert!(result.is_err());
    }
}
