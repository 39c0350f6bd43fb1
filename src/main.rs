//! forge – command-line paginator: HTML segments → multi-page PDF.
//!
//! Usage:
//!   forge <segment.html>... [-o out.pdf] [--config cfg.json] [--landscape]
//!         [--title "My Report"] [--png-dir DIR] [--layout-json FILE]
//!
//! Each input file is one segment and starts on a fresh page. If `-o` is
//! omitted the PDF is written next to the first input with the same stem
//! (e.g. `report.html` → `report.pdf`).

use std::{env, fs, path::Path, path::PathBuf, process};

use page_forge::compositor::{Document, Segment};
use page_forge::layout_config::DocumentLayout;
use page_forge::page::PageOrientation;
use page_forge::pdf::encode_pdf;
use page_forge::pipeline::{compose_document, PipelineConfig};
use page_forge::PaginateError;

struct Args {
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    landscape: bool,
    title: Option<String>,
    png_dir: Option<PathBuf>,
    layout_json: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    let argv: Vec<String> = env::args().collect();
    let prog = argv.first().map(String::as_str).unwrap_or("forge");
    let args = parse_args(prog, &argv[1..]);

    if let Err(e) = run(&args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn parse_args(prog: &str, raw: &[String]) -> Args {
    let mut args = Args {
        inputs: Vec::new(),
        output: None,
        config: None,
        landscape: false,
        title: None,
        png_dir: None,
        layout_json: None,
    };

    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| match iter.next() {
            Some(v) => v.clone(),
            None => {
                eprintln!("Missing value for {flag}");
                print_usage(prog);
                process::exit(1);
            }
        };
        match arg.as_str() {
            "--output" | "-o" => args.output = Some(PathBuf::from(value(arg))),
            "--config" | "-c" => args.config = Some(PathBuf::from(value(arg))),
            "--title" | "-t" => args.title = Some(value(arg)),
            "--png-dir" => args.png_dir = Some(PathBuf::from(value(arg))),
            "--layout-json" => args.layout_json = Some(PathBuf::from(value(arg))),
            "--landscape" | "-l" => args.landscape = true,
            "--help" | "-h" => {
                print_usage(prog);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(prog);
                process::exit(1);
            }
            path => args.inputs.push(PathBuf::from(path)),
        }
    }

    if args.inputs.is_empty() {
        eprintln!("Error: no input file specified.");
        print_usage(prog);
        process::exit(1);
    }
    args
}

fn run(args: &Args) -> Result<(), PaginateError> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if args.landscape {
        config.orientation = PageOrientation::Landscape;
    }
    // Default title: stem of the first input filename.
    config.title = match &args.title {
        Some(t) => t.clone(),
        None => args.inputs[0]
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("page-forge output")
            .to_string(),
    };

    let segments = args
        .inputs
        .iter()
        .map(|path| {
            fs::read_to_string(path)
                .map(Segment::new)
                .map_err(|e| PaginateError::Io(std::io::Error::new(e.kind(), format!("{}: {e}", path.display()))))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let document = compose_document(&segments, &config)?;
    let bytes = encode_pdf(&document, &config.title)?;

    // Default output: same directory + same stem as the first input, but with .pdf
    let output = args.output.clone().unwrap_or_else(|| {
        let mut o = args.inputs[0].clone();
        o.set_extension("pdf");
        o
    });
    write_file(&output, &bytes)?;

    if let Some(dir) = &args.png_dir {
        write_pngs(&document, dir)?;
    }
    if let Some(path) = &args.layout_json {
        let layout = DocumentLayout::from_document(&document, &config.title);
        write_file(path, layout.to_json()?.as_bytes())?;
    }

    let pages = document.page_count();
    eprintln!(
        "Wrote '{}' ({} bytes, {} page{}, {} segment{})",
        output.display(),
        bytes.len(),
        pages,
        if pages == 1 { "" } else { "s" },
        document.segments().len(),
        if document.segments().len() == 1 { "" } else { "s" }
    );
    Ok(())
}

/// Write `bytes`, creating the parent directory if necessary.
fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PaginateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, bytes)?;
    Ok(())
}

fn write_pngs(document: &Document, dir: &Path) -> Result<(), PaginateError> {
    fs::create_dir_all(dir)?;
    for (index, image) in document.page_images()?.into_iter().enumerate() {
        image.save(dir.join(format!("page-{:03}.png", index + 1)))?;
    }
    Ok(())
}

fn print_usage(prog: &str) {
    eprintln!("forge – paginate HTML segments into a PDF (page-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <segment.html>... [-o out.pdf] [--config cfg.json] [--landscape] [--title \"My Report\"]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <segment.html>   One or more HTML files; each starts on a fresh page");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --output, -o     Output path (default: first input's stem with .pdf)");
    eprintln!("  --config, -c     JSON pipeline config (page, margins, scale, reserves, ...)");
    eprintln!("  --title, -t      Document title in PDF metadata (default: input filename stem)");
    eprintln!("  --landscape      Use landscape page orientation");
    eprintln!("  --png-dir        Also write every page as page-NNN.png into this directory");
    eprintln!("  --layout-json    Also write the page/region layout as JSON");
    eprintln!("  --help           Print this message");
}
