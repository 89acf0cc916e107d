use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use varmerge::{
    commands::{
        varmerge_cadd, varmerge_clinvar_xml, varmerge_lovd_vcf, varmerge_merge,
        varmerge_spliceai, MergeMode,
    },
    config::{CaddConfig, MergeConfig, SpliceAiConfig, DEFAULT_CADD_URL, DEFAULT_CHUNK_ROWS},
    key::DEFAULT_CHROMOSOME,
    merge::SourcePaths,
    prelude::VarMergeError,
    reporting::{CommandOutput, Report},
};

const INFO: &str = "\
varmerge: harmonize LOVD, gnomAD, ClinVar, and custom variant records by genomic coordinate
usage: varmerge [--help] <subcommand>

Subcommands:

  merge: merge source files into one CSV keyed by chrom-pos-ref-alt.
  cadd: add CADD scores to a merged CSV through the CADD web service.
  spliceai: add SpliceAI scores to a merged CSV.
  clinvar-xml: convert a ClinVar XML download to CSV.
  lovd-vcf: write the GRCh38 variants of a LOVD export as VCF.

";

#[derive(Parser)]
#[clap(name = "varmerge")]
#[clap(about = INFO)]
struct Cli {
    /// increase logging (-d info, -dd debug, -ddd trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    All,
    LovdGnomad,
    LovdClinvar,
}

impl From<Mode> for MergeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::All => MergeMode::All,
            Mode::LovdGnomad => MergeMode::LovdGnomad,
            Mode::LovdClinvar => MergeMode::LovdClinvar,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    Merge {
        /// the LOVD flat-text export
        #[arg(long, required = true)]
        lovd: PathBuf,

        /// the gnomAD CSV export
        #[arg(long)]
        gnomad: Option<PathBuf>,

        /// the ClinVar CSV or XML export
        #[arg(long)]
        clinvar: Option<PathBuf>,

        /// an optional custom CSV, TSV, or spreadsheet file
        #[arg(long)]
        custom: Option<PathBuf>,

        /// a GRCh37 to GRCh38 chain file, used to lift over LOVD rows lacking
        /// GRCh38 notation
        #[arg(long)]
        chain: Option<PathBuf>,

        /// which sources to merge
        #[arg(long, value_enum, default_value_t = Mode::All)]
        mode: Mode,

        /// the chromosome LOVD genomic notation refers to
        #[arg(long, default_value = DEFAULT_CHROMOSOME)]
        chromosome: String,

        /// skip the gnomAD popmax columns
        #[arg(long)]
        no_popmax: bool,

        /// the output CSV file
        #[arg(long, required = true)]
        output: PathBuf,

        /// replace the output file instead of appending to it
        #[arg(long = "override")]
        override_existing: bool,
    },
    Cadd {
        /// a merged CSV file with a gen_pos column
        #[arg(required = true)]
        input: PathBuf,

        /// directory for chunk scratch files
        #[arg(long, required = true)]
        workdir: PathBuf,

        /// the CADD web service
        #[arg(long, env = "CADD_URL", default_value = DEFAULT_CADD_URL)]
        url: String,

        /// target rows per chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_ROWS)]
        chunk_rows: usize,

        /// threads for encoding and decoding chunks (0 = all cores)
        #[arg(long, default_value_t = 0)]
        threads: usize,

        /// polls after the first before a chunk is given up on
        #[arg(long, default_value_t = 15)]
        max_retries: usize,

        /// seconds between polls
        #[arg(long, default_value_t = 120)]
        retry_delay: u64,

        /// only score the first MAX_ENTRIES rows
        #[arg(long, env = "MAX_ENTRIES")]
        max_entries: Option<usize>,

        /// the output CSV file
        #[arg(long, required = true)]
        output: PathBuf,
    },
    Spliceai {
        /// a merged CSV file with a gen_pos column
        #[arg(required = true)]
        input: PathBuf,

        /// the GRCh38 reference FASTA
        #[arg(long, required = true)]
        fasta: PathBuf,

        /// directory for the SpliceAI input and output VCFs
        #[arg(long, required = true)]
        workdir: PathBuf,

        /// gene annotation: grch37, grch38, or a custom annotation file
        #[arg(long, default_value = "grch38")]
        annotation: String,

        /// maximum distance between a variant and a gained or lost splice site
        #[arg(long, default_value_t = 500)]
        distance: u32,

        /// the spliceai executable
        #[arg(long, default_value = "spliceai")]
        spliceai: PathBuf,

        /// run on CUDA, batching predictions
        #[arg(long, env = "CUDA")]
        cuda: bool,

        /// predictions per batch when running on CUDA
        #[arg(long, env = "CUDA_BATCH_SIZE", default_value_t = 32)]
        cuda_batch_size: u32,

        /// only score the first MAX_ENTRIES rows
        #[arg(long, env = "MAX_ENTRIES")]
        max_entries: Option<usize>,

        /// the output CSV file
        #[arg(long, required = true)]
        output: PathBuf,
    },
    ClinvarXml {
        /// a ClinVar VariationArchive XML file
        #[arg(required = true)]
        input: PathBuf,

        /// the output CSV file
        #[arg(long, required = true)]
        output: PathBuf,
    },
    LovdVcf {
        /// the LOVD flat-text export
        #[arg(required = true)]
        lovd: PathBuf,

        /// the output VCF file
        #[arg(long, required = true)]
        output: PathBuf,
    },
}

fn init_logging(debug: u8) {
    let level = match debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn report_issues<U>(output: &CommandOutput<U>) {
    let report: &Report = output.report();
    if !report.is_empty() {
        eprint!("Notes:\n{}", report);
    }
}

fn run() -> Result<(), VarMergeError> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match &cli.command {
        Some(Commands::Merge {
            lovd,
            gnomad,
            clinvar,
            custom,
            chain,
            mode,
            chromosome,
            no_popmax,
            output,
            override_existing,
        }) => {
            let paths = SourcePaths {
                lovd: lovd.clone(),
                gnomad: gnomad.clone(),
                clinvar: clinvar.clone(),
                custom: custom.clone(),
            };
            let config = MergeConfig::new()
                .with_chromosome(chromosome.clone())
                .with_popmax(!*no_popmax);
            let result = varmerge_merge(
                &paths,
                chain.as_ref(),
                (*mode).into(),
                &config,
                output,
                *override_existing,
            )?;
            report_issues(&result);
        }
        Some(Commands::Cadd {
            input,
            workdir,
            url,
            chunk_rows,
            threads,
            max_retries,
            retry_delay,
            max_entries,
            output,
        }) => {
            let config = CaddConfig::new()
                .with_base_url(url.clone())
                .with_chunk_rows(*chunk_rows)
                .with_num_threads(*threads)
                .with_polling(*max_retries, Duration::from_secs(*retry_delay))
                .with_max_entries(*max_entries);
            let result = varmerge_cadd(input, workdir, config, output)?;
            report_issues(&result);
        }
        Some(Commands::Spliceai {
            input,
            fasta,
            workdir,
            annotation,
            distance,
            spliceai,
            cuda,
            cuda_batch_size,
            max_entries,
            output,
        }) => {
            let config = SpliceAiConfig::new()
                .with_binary(spliceai.clone())
                .with_annotation(annotation.clone())
                .with_distance(*distance)
                .with_cuda_batch_size(cuda.then_some(*cuda_batch_size))
                .with_max_entries(*max_entries);
            let result = varmerge_spliceai(input, fasta, workdir, config, output)?;
            report_issues(&result);
        }
        Some(Commands::ClinvarXml { input, output }) => {
            let result = varmerge_clinvar_xml(input, output)?;
            report_issues(&result);
        }
        Some(Commands::LovdVcf { lovd, output }) => {
            let result = varmerge_lovd_vcf(lovd, output)?;
            report_issues(&result);
        }
        None => {
            println!("{}\n", INFO);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn main() {
    match run() {
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
