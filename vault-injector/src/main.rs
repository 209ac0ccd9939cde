//! Command-line tool for injecting Vault settings into Kubernetes manifests.

use structopt::StructOpt;
use vault_injector_common::{
    prelude::*, quick_main, tracing_support::initialize_tracing,
};

mod cmd;
mod description;

/// Command-line options, parsed using `structopt`.
#[derive(Debug, StructOpt)]
#[structopt(about = "Point Kubernetes containers at a Vault server.")]
enum Opt {
    /// Print the Vault environment variables implied by a config.
    #[structopt(name = "env")]
    Env {
        #[structopt(flatten)]
        config: cmd::ConfigOpt,
    },

    /// Inject Vault settings into a single container and print the result.
    #[structopt(name = "container")]
    Container {
        #[structopt(flatten)]
        config: cmd::ConfigOpt,

        /// Path to a YAML or JSON container definition.
        #[structopt(parse(from_os_str))]
        container: PathBuf,
    },

    /// Inject Vault settings into a pod and print the result.
    #[structopt(name = "pod")]
    Pod {
        #[structopt(flatten)]
        config: cmd::ConfigOpt,

        /// Don't apply the pod's `vault.security/*` annotations.
        #[structopt(long = "ignore-annotations")]
        ignore_annotations: bool,

        /// Path to a YAML or JSON pod manifest.
        #[structopt(parse(from_os_str))]
        pod: PathBuf,
    },

    /// Explain what injection would do, in human-readable form.
    #[structopt(name = "describe")]
    Describe {
        #[structopt(flatten)]
        config: cmd::ConfigOpt,

        /// A YAML map of annotations to apply on top of the config.
        #[structopt(long = "annotations", parse(from_os_str))]
        annotations: Option<PathBuf>,
    },
}

quick_main!(run);

/// Our real entry point.
fn run() -> Result<()> {
    initialize_tracing();
    let opt = Opt::from_args();
    debug!("Args: {:?}", opt);

    match opt {
        Opt::Env { ref config } => cmd::env::run(config),
        Opt::Container {
            ref config,
            ref container,
        } => cmd::container::run(config, container),
        Opt::Pod {
            ref config,
            ignore_annotations,
            ref pod,
        } => cmd::pod::run(config, ignore_annotations, pod),
        Opt::Describe {
            ref config,
            ref annotations,
        } => cmd::describe::run(config, annotations.as_deref()),
    }
}
