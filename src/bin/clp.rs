//! `clp` - thin CLI wrapper around the archive writer/reader.
//!
//! Usage:
//!   clp compress <input-path|-> <output-dir> [--compression-level N]
//!               [--target-segment-size BYTES] [--creator-uuid U] [--json]
//!   clp extract <archive-dir>
//!   clp search <archive-dir> <pattern>
//!
//! Demonstrates the core pipeline over a single input path or stdin; it does
//! not walk directory trees looking for logs.

use std::fs;
use std::io::{self, BufRead, Read};
use std::path::PathBuf;

use clparchive::archive::{Archive, DecodedRecord};
use clparchive::config::ArchiveConfig;
use clparchive::dictionary::variable_dict::wildcard_match;
use clparchive::error::Result;
use clparchive::json_codec::encode_json;
use clparchive::parser::{parse_json_line, TextLineParser};
use clparchive::stager::{FileKind, StagedFile};
use clparchive::text_codec::encode_text;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_writer(io::stderr).try_init();
}

fn main() {
    init_logging();
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("clp {}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }
    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        std::process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let result = match args[1].as_str() {
        "compress" => run_compress(&args[2..]),
        "extract" => run_extract(&args[2..]),
        "search" => run_search(&args[2..]),
        other => {
            eprintln!("unknown subcommand: {other}");
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("clp: {e} ({})", e.code());
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  clp compress <input-path|-> <output-dir> [--compression-level N]");
    eprintln!("               [--target-segment-size BYTES] [--creator-uuid U] [--json]");
    eprintln!("  clp extract <archive-dir>");
    eprintln!("  clp search <archive-dir> <pattern>");
}

struct CompressArgs {
    input: String,
    output_dir: PathBuf,
    compression_level: i32,
    target_segment_size: u64,
    creator_uuid: u128,
    json_input: bool,
}

fn parse_compress_args(args: &[String]) -> anyhow::Result<CompressArgs> {
    let mut positional = Vec::new();
    let mut compression_level = 3;
    let mut target_segment_size = 256 * 1024 * 1024;
    let mut creator_uuid = 1u128;
    let mut json_input = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--compression-level" => {
                i += 1;
                compression_level = args.get(i).ok_or_else(|| anyhow::anyhow!("--compression-level needs a value"))?.parse()?;
            }
            "--target-segment-size" => {
                i += 1;
                target_segment_size = args.get(i).ok_or_else(|| anyhow::anyhow!("--target-segment-size needs a value"))?.parse()?;
            }
            "--creator-uuid" => {
                i += 1;
                creator_uuid = args.get(i).ok_or_else(|| anyhow::anyhow!("--creator-uuid needs a value"))?.parse()?;
            }
            "--json" => json_input = true,
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    if positional.len() < 2 {
        anyhow::bail!("compress requires <input-path|-> and <output-dir>");
    }
    Ok(CompressArgs {
        input: positional[0].clone(),
        output_dir: PathBuf::from(&positional[1]),
        compression_level,
        target_segment_size,
        creator_uuid,
        json_input,
    })
}

fn run_compress(args: &[String]) -> Result<()> {
    let parsed = parse_compress_args(args).map_err(|e| clparchive::error::ArchiveError::BadParam(e.to_string()))?;

    let config = ArchiveConfig {
        encoder: Default::default(),
        target_segment_uncompressed_size: parsed.target_segment_size,
        compression_level: parsed.compression_level,
    };
    let mut archive = Archive::open(parsed.output_dir.as_path(), config, parsed.creator_uuid, 0)?;

    let input: Box<dyn Read> = if parsed.input == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(fs::File::open(&parsed.input)?)
    };
    let reader = io::BufReader::new(input);

    let file_id = archive.next_file_id();
    let original_path = PathBuf::from(&parsed.input);

    if parsed.json_input {
        compress_json_lines(&mut archive, reader, file_id, original_path)?;
    } else {
        compress_text_lines(&mut archive, reader, file_id, original_path)?;
    }

    let uuid = archive.uuid;
    archive.close()?;
    println!("wrote archive {:032x} to {}", uuid, parsed.output_dir.display());
    Ok(())
}

fn compress_text_lines(archive: &mut Archive, reader: impl BufRead, file_id: u64, original_path: PathBuf) -> Result<()> {
    let mut file = StagedFile::new(file_id, original_path, 0, 0, FileKind::Text);
    let mut parser = TextLineParser::new();

    for line in reader.lines() {
        let line = line?;
        if let Some(message) = parser.push_line(&line) {
            write_text_message(archive, &mut file, &message.text, message.timestamp.unwrap_or(0))?;
        }
    }
    if let Some(message) = parser.drain() {
        write_text_message(archive, &mut file, &message.text, message.timestamp.unwrap_or(0))?;
    }
    for (index, pattern) in parser.pattern_switches() {
        file.record_pattern_switch(*index, pattern);
    }

    file.release()?;
    archive.mark_file_ready_for_segment(file)
}

fn write_text_message(archive: &mut Archive, file: &mut StagedFile, text: &str, ts: i64) -> Result<()> {
    let config = archive.config().encoder.clone();
    let encoded = encode_text(text, &config, archive.var_dict_mut());
    let num_vars = encoded.vars.len();
    let (template_id, _) = archive.logtype_dict_mut().insert_or_get(encoded.template, encoded.verbosity, num_vars);
    file.write_encoded_msg(ts, template_id as i64, &encoded.vars, text.len() as u64 + 1)
}

fn compress_json_lines(archive: &mut Archive, reader: impl BufRead, file_id: u64, original_path: PathBuf) -> Result<()> {
    let mut file = StagedFile::new(file_id, original_path, 0, 0, FileKind::Json);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some((value, ts)) = parse_json_line(&line, None) else {
            continue;
        };
        let config = archive.config().encoder.clone();
        let encoded = {
            let var_dict = archive.var_dict_mut();
            let logtype_dict = archive.logtype_dict_mut();
            encode_json(value, &config, var_dict, logtype_dict)
        };
        let num_vars = encoded.vars.len();
        let (jsontype_id, _) = archive.jsontype_dict_mut().insert_or_get(encoded.value, num_vars);
        file.write_encoded_json_msg(ts.unwrap_or(0), jsontype_id as i64, &encoded.vars, line.len() as u64 + 1, &encoded.extracted_leaves)?;
    }
    file.release()?;
    archive.mark_file_ready_for_segment(file)
}

fn run_extract(args: &[String]) -> Result<()> {
    let archive_dir = args.first().ok_or_else(|| clparchive::error::ArchiveError::BadParam("extract requires <archive-dir>".into()))?;
    let archive = Archive::open(archive_dir.as_str(), ArchiveConfig::default(), 1, 0)?;
    for record in archive.file_metadata() {
        for decoded in archive.decode_records(record)? {
            print_record(&decoded);
        }
    }
    Ok(())
}

fn run_search(args: &[String]) -> Result<()> {
    if args.len() < 2 {
        return Err(clparchive::error::ArchiveError::BadParam("search requires <archive-dir> <pattern>".into()));
    }
    let archive_dir = &args[0];
    let pattern = &args[1];
    let archive = Archive::open(archive_dir.as_str(), ArchiveConfig::default(), 1, 0)?;

    // Each staged file's records decode independently of every other file's,
    // so fan the per-file decode+match work out across a rayon pool -- search
    // is the one place in the pipeline where multiple segments/files are
    // read side by side rather than sequentially.
    use rayon::prelude::*;
    let mut matches: Vec<(u64, Vec<DecodedRecord>)> = archive
        .file_metadata()
        .par_iter()
        .map(|record| -> Result<(u64, Vec<DecodedRecord>)> {
            let hits = archive
                .decode_records(record)?
                .into_iter()
                .filter(|decoded| record_matches(decoded, pattern))
                .collect();
            Ok((record.file_id, hits))
        })
        .collect::<Result<Vec<_>>>()?;
    matches.sort_by_key(|(file_id, _)| *file_id);

    for (_, hits) in matches {
        for decoded in hits {
            print_record(&decoded);
        }
    }
    Ok(())
}

fn record_matches(record: &DecodedRecord, pattern: &str) -> bool {
    let (_, haystack) = render_record(record);
    wildcard_match(pattern, &haystack, false) || haystack.contains(pattern)
}

fn render_record(record: &DecodedRecord) -> (i64, String) {
    match record {
        DecodedRecord::Text { ts, message } => (*ts, message.clone()),
        DecodedRecord::Json { ts, value } => (*ts, value.to_string()),
    }
}

fn print_record(record: &DecodedRecord) {
    let (ts, rendered) = render_record(record);
    println!("{ts}\t{rendered}");
}
