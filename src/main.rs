use anyhow::Context;
use clap::Parser;
use esme_profiles::{
    config::PipelineConfig, convert, graph::Figure, render::Graphing, session::Session,
    tech_map::TechMap,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Inputs shared by every command that works on one results artifact.
#[derive(clap::Args, Debug)]
struct Inputs {
    /// A results directory of CSV sheets or a SQLite results file
    artifact: PathBuf,

    /// Technology map CSV with an `actors` column plus grouping and
    /// coloring columns
    #[clap(short, long)]
    tech_map: PathBuf,

    /// Optional YAML pipeline config; defaults are used for missing keys
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Bucket size in base timesteps. Defaults to the config value.
    #[clap(short, long)]
    granularity: Option<u32>,
}

#[derive(clap::Parser, Debug)]
enum Args {
    /// Lists the results artifacts found in a directory.
    // cargo run list-results results/
    ListResults {
        /// Directory holding results artifacts
        results_dir: PathBuf,
    },

    /// Reconstructs the full-horizon profile of one node and writes it
    /// as a CSV.
    // cargo run write-profile results/run1 -t tech_map.csv --node elec_gb out/elec_gb.csv
    WriteProfile {
        #[clap(flatten)]
        inputs: Inputs,

        /// Node whose flows are reconstructed
        #[clap(short, long)]
        node: String,

        /// Where the output csv will be written
        csv_out: PathBuf,
    },

    /// Charts every node's supply and demand over the whole horizon.
    // cargo run graph-full results/run1 -t tech_map.csv out/full.png
    GraphFull {
        #[clap(flatten)]
        inputs: Inputs,

        /// A `.png` is drawn; any other extension gets the figure as JSON.
        output: PathBuf,
    },

    /// Charts the representative periods of one year side by side.
    // cargo run graph-year results/run1 -t tech_map.csv --year 2030 out/2030.png
    GraphYear {
        #[clap(flatten)]
        inputs: Inputs,

        #[clap(short, long)]
        year: i32,

        /// A `.png` is drawn; any other extension gets the figure as JSON.
        output: PathBuf,
    },

    /// Builds the per-year dashboard with flows, storage levels and a
    /// year selector.
    // cargo run graph-dashboard results/run1 -t tech_map.csv out/dashboard.json
    GraphDashboard {
        #[clap(flatten)]
        inputs: Inputs,

        /// Year selected initially. Defaults to the first year.
        #[clap(short, long)]
        year: Option<i32>,

        /// A `.png` is drawn; any other extension gets the figure as JSON.
        output: PathBuf,
    },
}

impl Inputs {
    /// Loads config, technology map and results into a fresh session and
    /// returns it with the granularity to use.
    fn open(&self) -> anyhow::Result<(Session, u32)> {
        let config = match &self.config {
            Some(path) => PipelineConfig::load_yaml(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        let granularity = self.granularity.unwrap_or(config.granularity);
        let tech_map =
            TechMap::load_csv(&self.tech_map, &config.grouping_column, &config.coloring_column)
                .with_context(|| format!("reading technology map {}", self.tech_map.display()))?;

        let session = Session::new(config, tech_map);
        session
            .load(&self.artifact)
            .with_context(|| format!("loading results {}", self.artifact.display()))?;
        Ok((session, granularity))
    }
}

fn write_figure(output: &Path, figure: &Figure) -> anyhow::Result<()> {
    if output.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")) {
        Graphing::new(output).figure(figure)?;
    } else {
        let file = File::create(output)
            .with_context(|| format!("creating {}", output.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), figure)?;
    }
    info!(output = %output.display(), traces = figure.traces.len(), "figure written");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Args::parse() {
        Args::ListResults { results_dir } => {
            for artifact in convert::list_artifacts(&results_dir)? {
                println!("{}", artifact.display());
            }
        }
        Args::WriteProfile {
            inputs,
            node,
            csv_out,
        } => {
            let (session, granularity) = inputs.open()?;
            let profile = session.full_profile(&node, granularity)?;
            convert::write_profile_csv(&csv_out, &profile)?;
            info!(node = %node, rows = profile.len(), "profile written");
        }
        Args::GraphFull { inputs, output } => {
            let (session, granularity) = inputs.open()?;
            write_figure(&output, &session.render_full(granularity)?)?;
        }
        Args::GraphYear {
            inputs,
            year,
            output,
        } => {
            let (session, granularity) = inputs.open()?;
            write_figure(&output, &session.render_year(year, granularity)?)?;
        }
        Args::GraphDashboard {
            inputs,
            year,
            output,
        } => {
            let (session, granularity) = inputs.open()?;
            let mut figure = session.render_selectable_year(granularity)?;
            if let Some(year) = year {
                anyhow::ensure!(figure.select_year(year), "no patterns for year {year}");
            }
            write_figure(&output, &figure)?;
        }
    }
    Ok(())
}
