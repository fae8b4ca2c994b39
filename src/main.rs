use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};
use gis_qa_partitioner::io::{feature_to_geojson, find_feature};
use gis_qa_partitioner::layout::Bucket;
use gis_qa_partitioner::report::DetailLedger;
use gis_qa_partitioner::{
    consolidate_valid, BatchRunner, ConversionEngine, OutputLayout, PartitionConfig, Progress,
    Provenance,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .required(true)
        .value_parser(clap::value_parser!(PathBuf))
        .help("Output directory holding the stores and reports")
}

fn cli() -> Command {
    Command::new("GIS QA Partitioner")
        .version("1.0")
        .author("Jesper Fjellin")
        .about("Validates land-plot datasets and partitions features into valid, review and candidate stores")
        .subcommand_required(true)
        .subcommand(
            Command::new("validate")
                .about("Validate and partition GeoJSON datasets")
                .arg(
                    Arg::new("inputs")
                        .num_args(1..)
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Input files; anything that is not GeoJSON is set aside"),
                )
                .arg(output_arg())
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("JSON file with simplify/autofix/identify_candidates toggles"),
                )
                .arg(
                    Arg::new("no-simplify")
                        .long("no-simplify")
                        .action(ArgAction::SetTrue)
                        .help("Keep valid polygons as they are"),
                )
                .arg(
                    Arg::new("no-autofix")
                        .long("no-autofix")
                        .action(ArgAction::SetTrue)
                        .help("Send invalid geometries to review instead of repairing them"),
                )
                .arg(
                    Arg::new("no-candidates")
                        .long("no-candidates")
                        .action(ArgAction::SetTrue)
                        .help("Do not flag polygons under 4 ha for conversion"),
                ),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert candidate polygons to centroid points")
                .arg(output_arg())
                .arg(
                    Arg::new("ids")
                        .num_args(1..)
                        .required(true)
                        .help("Traceability ids of the candidates to convert"),
                ),
        )
        .subcommand(
            Command::new("consolidate")
                .about("Merge all valid stores into one collection")
                .arg(output_arg()),
        )
        .subcommand(
            Command::new("show")
                .about("Print one feature from a dataset's store as GeoJSON")
                .arg(output_arg())
                .arg(
                    Arg::new("store")
                        .long("store")
                        .value_parser(["valid", "review", "candidates"])
                        .default_value("valid")
                        .help("Store to look in"),
                )
                .arg(
                    Arg::new("dataset")
                        .long("dataset")
                        .help("Dataset stem; looked up in the detailed report when omitted"),
                )
                .arg(Arg::new("id").required(true).help("Traceability id of the feature")),
        )
}

fn output_layout(matches: &ArgMatches) -> OutputLayout {
    let root = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("output"));
    OutputLayout::new(root)
}

fn load_config(matches: &ArgMatches) -> gis_qa_partitioner::Result<PartitionConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => PartitionConfig::from_json_file(path)?,
        None => PartitionConfig::default(),
    };
    if matches.get_flag("no-simplify") {
        config.simplify = false;
    }
    if matches.get_flag("no-autofix") {
        config.autofix = false;
    }
    if matches.get_flag("no-candidates") {
        config.identify_candidates = false;
    }
    Ok(config)
}

fn validate(matches: &ArgMatches) -> gis_qa_partitioner::Result<()> {
    let inputs: Vec<PathBuf> = matches
        .get_many::<PathBuf>("inputs")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if let Some(missing) = inputs.iter().find(|p| !p.exists()) {
        return Err(gis_qa_partitioner::Error::io(
            missing,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }

    let layout = output_layout(matches);
    let runner = BatchRunner::new(layout.clone(), load_config(matches)?);
    let progress = |p: &Progress| {
        info!("[{:>3}%] {} ({}/{})", p.percent(), p.dataset, p.completed, p.total);
    };
    let report = runner.run(&inputs, Some(&progress))?;

    for row in &report.summary {
        println!(
            "{}: {:?} / {:?} - {}",
            row.dataset, row.initial_status, row.processing_status, row.notes
        );
    }
    println!("Reports written to {}", layout.root().display());
    Ok(())
}

fn convert(matches: &ArgMatches) -> gis_qa_partitioner::Result<()> {
    let ids: Vec<String> = matches
        .get_many::<String>("ids")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let engine = ConversionEngine::new(output_layout(matches));
    let result = engine.convert(&ids)?;
    println!("Converted {} feature(s)", result.converted_count);
    if !result.failed_identifiers.is_empty() {
        println!("Failed: {}", result.failed_identifiers.join(", "));
    }
    Ok(())
}

fn consolidate(matches: &ArgMatches) -> gis_qa_partitioner::Result<()> {
    let layout = output_layout(matches);
    match consolidate_valid(&layout)? {
        Some(path) => println!("Consolidated valid features: {}", path.display()),
        None => println!("No valid features to consolidate"),
    }
    Ok(())
}

fn show(matches: &ArgMatches) -> gis_qa_partitioner::Result<()> {
    let layout = output_layout(matches);
    let id = matches.get_one::<String>("id").cloned().unwrap_or_default();
    let bucket = matches
        .get_one::<String>("store")
        .and_then(|name| Bucket::from_name(name))
        .unwrap_or(Bucket::Valid);
    let stem = match matches.get_one::<String>("dataset") {
        Some(stem) => stem.clone(),
        None => DetailLedger::load(&layout.detail_ledger())?
            .dataset_of(&id)
            .map(str::to_string)
            .unwrap_or_else(|| Provenance::legacy_stem(&id)),
    };

    match find_feature(&layout, bucket, &stem, &id)? {
        Some(feature) => println!("{}", serde_json::to_string_pretty(&feature_to_geojson(&feature))?),
        None => println!("{id} not found in {stem}'s {bucket:?} store"),
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = cli().get_matches();
    let result = match matches.subcommand() {
        Some(("validate", sub)) => validate(sub),
        Some(("convert", sub)) => convert(sub),
        Some(("consolidate", sub)) => consolidate(sub),
        Some(("show", sub)) => show(sub),
        _ => unreachable!("subcommand_required is set"),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let matches = cli()
            .try_get_matches_from(["gis-qa", "validate", "a.geojson", "-o", "out", "--no-candidates"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let config = load_config(sub).unwrap();
        assert!(!config.identify_candidates);
        assert!(config.simplify && config.autofix);
    }
}
