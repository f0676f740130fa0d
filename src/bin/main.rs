use anyhow::{bail, Context, Result};
use clap::builder::TypedValueParser;
use clap::Parser;
use dicom_core::Tag;
use dicom_deidentify::config::{ProfileConfig, UidRoot};
use dicom_deidentify::core::CoreBuilder;
use dicom_deidentify::rules::{Profile, Rule, RuleSet};
use dicom_deidentify::{Deidentifier, DeidentificationError, Operator, TagIdentifier};
use dicom_dictionary_std::tags;
use dicom_object::DefaultDicomObject;
use env_logger::Builder;
use log::{warn, Level, LevelFilter};
use rayon::prelude::*;
use std::fmt;
use std::{
    fs::File,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    str::FromStr,
};
use walkdir::WalkDir;

#[derive(Clone)]
struct TagValueParser;

impl TypedValueParser for TagValueParser {
    type Value = Tag;

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let s = value.to_str().ok_or_else(|| {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidUtf8,
                "invalid exclude tag(s)",
            )
        })?;

        Tag::from_str(s).map_err(|_e| {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                format!("{s} is not a valid tag"),
            )
        })
    }
}

/// De-identify DICOM files
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input file ('-' for stdin) or directory
    #[arg(short, long, value_name = "INPUT_PATH")]
    input: PathBuf,

    /// Output file ('-' for stdout) or directory
    #[arg(short, long, value_name = "OUTPUT_PATH")]
    output: PathBuf,

    /// Profile configuration file (JSON); the built-in profile when omitted
    #[arg(short, long, value_name = "PROFILE_PATH")]
    profile: Option<PathBuf>,

    /// UID root (default: '9999')
    #[arg(short, long)]
    uid_root: Option<String>,

    /// Recursively look for files in input directory
    #[arg(short, long)]
    recursive: bool,

    /// Continue when a file found is not DICOM
    #[arg(short, long = "continue")]
    r#continue: bool,

    /// Show more verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Tags to exclude from de-identification, e.g. "00100020,00080050"
    #[arg(long, value_name = "TAGS", value_delimiter = ',', value_parser = TagValueParser)]
    exclude: Vec<Tag>,
}

struct DicomOutputFilePath {
    study_instance_uid: String,
    series_instance_uid: String,
    sop_instance_uid: String,
}

impl fmt::Display for DicomOutputFilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}.dcm",
            self.study_instance_uid, self.series_instance_uid, self.sop_instance_uid
        )
    }
}

impl DicomOutputFilePath {
    fn to_path_buf(&self) -> PathBuf {
        format!("{}", self).into()
    }

    fn from_dicom_object(obj: &DefaultDicomObject) -> Result<Self> {
        let study_instance_uid = obj.element(tags::STUDY_INSTANCE_UID)?.to_str()?;
        let series_instance_uid = obj.element(tags::SERIES_INSTANCE_UID)?.to_str()?;
        let sop_instance_uid = obj.element(tags::SOP_INSTANCE_UID)?.to_str()?;

        Ok(Self {
            study_instance_uid: study_instance_uid.to_string(),
            series_instance_uid: series_instance_uid.to_string(),
            sop_instance_uid: sop_instance_uid.to_string(),
        })
    }
}

fn deidentify_one(
    deidentifier: &Deidentifier,
    input_path: &PathBuf,
    output_path: &PathBuf,
) -> Result<()> {
    let input_src: Box<dyn Read> = if input_path == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(
            File::open(input_path)
                .with_context(|| format!("failed to open {}", input_path.display()))?,
        )
    };

    let result = deidentifier
        .deidentify(input_src)
        .with_context(|| format!("failed to de-identify {}", input_path.display()))?;

    let output_target: Box<dyn Write> = if output_path == Path::new("-") {
        Box::new(io::stdout().lock())
    } else {
        let output_file_path = if output_path.is_dir() {
            let file_path = DicomOutputFilePath::from_dicom_object(&result.deidentified)?;
            &output_path.join(file_path.to_path_buf())
        } else {
            output_path
        };

        if let Some(parent_dir) = output_file_path.parent() {
            std::fs::create_dir_all(parent_dir)?;
        }

        Box::new(
            File::create(output_file_path)
                .with_context(|| format!("failed to create {}", output_file_path.display()))?,
        )
    };
    result.write(output_target)?;

    Ok(())
}

fn load_profile(path: &Path) -> Result<Profile> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = ProfileConfig::from_json(&json)?;
    Ok(config.to_profile()?)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    let mut builder = Builder::from_default_env();
    builder
        .format(|buf, record| {
            let level = match record.level() {
                Level::Error => "Error",
                Level::Warn => "Warning",
                Level::Info => "Info",
                Level::Debug => "Debug",
                Level::Trace => "Trace",
            };
            writeln!(buf, "{}: {}", level, record.args())
        })
        .filter(None, log_level);
    builder.init();

    let mut core_builder = CoreBuilder::default();

    let mut profile = match &args.profile {
        Some(path) => load_profile(path)?,
        None => dicom_deidentify::config::default_profile(),
    };

    // tags excluded on the command line get a keep rule overriding the rest
    if !args.exclude.is_empty() {
        let exclusions = RuleSet::new(
            "command line exclusions",
            args.exclude
                .iter()
                .map(|tag| Rule::new(TagIdentifier::Single(*tag), Operator::Keep)),
        );
        let mut rule_sets = profile.rule_sets().to_vec();
        rule_sets.push(exclusions);
        profile = Profile::new(profile.name().to_string(), rule_sets);
    }
    core_builder = core_builder.profile(profile);

    if let Some(uid_root) = &args.uid_root {
        match uid_root.parse::<UidRoot>() {
            Ok(uid_root) => core_builder = core_builder.uid_root(uid_root),
            Err(e) => bail!(e),
        }
    }

    let deidentifier = Deidentifier::new(core_builder.build());

    // input is stdin or a file
    if args.input == Path::new("-") || args.input.is_file() {
        deidentify_one(&deidentifier, &args.input, &args.output)?;
        return Ok(());
    }

    // input is a directory
    if args.input.is_dir() {
        if args.output == Path::new("-") || !args.output.is_dir() {
            bail!("output path should be an existing directory");
        }

        let mut walk_dir = WalkDir::new(&args.input);
        if !args.recursive {
            walk_dir = walk_dir.max_depth(1);
        }

        let continue_on_read_error = args.r#continue;
        walk_dir
            .into_iter()
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path_buf = entry.into_path();
                if path_buf.is_file() {
                    Some(path_buf)
                } else {
                    None
                }
            })
            .par_bridge()
            .try_for_each(|path_buf| {
                let result = deidentify_one(&deidentifier, &path_buf, &args.output);
                match result {
                    Err(e) if continue_on_read_error => {
                        match e.downcast_ref::<DeidentificationError>() {
                            Some(DeidentificationError::Read(_))
                            | Some(DeidentificationError::Io(_)) => {
                                warn!("{}", e);
                                Ok(())
                            }
                            _ => Err(e),
                        }
                    }
                    other => other,
                }
            })?;

        return Ok(());
    }

    bail!("input should either be a file, stdin ('-') or a directory");
}
