//! utk - command-line front end for the Universal Toolkit operators.
//!
//! Lists, describes and runs single nodes outside a host, loading image and
//! mask inputs from files and writing image outputs as PNG.

use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use universal_toolkit::core::config;
use universal_toolkit::filters::builtin::describe;
use universal_toolkit::kernels::bridge::{dynamic_to_frame, dynamic_to_mask, frame_to_dynamic, plane_to_gray};
use universal_toolkit::prelude::*;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("utk");

    let (config_path, rest) = split_config_flag(&args[1.min(args.len())..]);
    if let Err(e) = init(config_path.as_deref()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(2);
    }

    let result = match rest.first().map(String::as_str) {
        None | Some("help") | Some("--help") | Some("-h") => {
            print_usage(program);
            Ok(())
        }
        Some("list") => list_nodes(rest.get(1).map(String::as_str)),
        Some("describe") => match rest.get(1) {
            Some(id) => describe_node(id),
            None => Err(anyhow!("describe needs a node identifier")),
        },
        Some("search") => match rest.get(1) {
            Some(query) => search_nodes(query),
            None => Err(anyhow!("search needs a query")),
        },
        Some("run") => match rest.get(1) {
            Some(id) => run_node(id, &rest[2..]),
            None => Err(anyhow!("run needs a node identifier")),
        },
        Some("config") => print_config(),
        Some(other) => {
            print_usage(program);
            Err(anyhow!("Unknown command: {}", other))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

// `--config <path>` may appear anywhere; everything else is returned in order.
fn split_config_flag(args: &[String]) -> (Option<PathBuf>, Vec<String>) {
    let mut path = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            path = iter.next().map(PathBuf::from);
        } else {
            rest.push(arg.clone());
        }
    }
    (path, rest)
}

fn init(config_path: Option<&Path>) -> Result<()> {
    let cfg = match config_path {
        Some(path) => ToolkitConfig::from_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => ToolkitConfig::from_env().context("loading configuration from environment")?,
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cfg.logging.level.as_str()))
        .format_timestamp_millis()
        .init();
    config::install(cfg);
    Ok(())
}

fn print_usage(program: &str) {
    println!("Universal Toolkit v{}", universal_toolkit::VERSION);
    println!();
    println!("Usage: {} [--config <file>] <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  list [category]         List operators, optionally for one category");
    println!("  describe <id>           Print the host descriptor of an operator");
    println!("  search <query>          Find operators by id, name, description or tag");
    println!("  run <id> [options]      Run one operator");
    println!("  config                  Print the active configuration as TOML");
    println!();
    println!("Run options:");
    println!("  --param <name>=<value>  Set a parameter (repeatable)");
    println!("  --input <name>=<value>  Set an input; image and mask inputs take a file path");
    println!("  --out <dir>             Directory for image and mask outputs (default: .)");
}

fn registry() -> Result<FilterRegistry> {
    FilterRegistry::with_builtins().context("building operator registry")
}

fn list_nodes(category: Option<&str>) -> Result<()> {
    let registry = registry()?;
    let wanted = category.map(str::to_lowercase);
    println!("Available operators ({} total):", registry.len());
    for (category, nodes) in registry.grouped_by_category() {
        if let Some(w) = &wanted {
            if category.display_name().to_lowercase() != *w {
                continue;
            }
        }
        println!();
        println!("  {}", category.path());
        for meta in nodes {
            println!("    {:<36} {}", meta.id, meta.name);
        }
    }
    Ok(())
}

fn describe_node(id: &str) -> Result<()> {
    let registry = registry()?;
    let meta = registry
        .get_metadata(id)
        .ok_or_else(|| anyhow!("Operator not found: {} (use 'list')", id))?;
    println!("{}", serde_json::to_string_pretty(&meta.host_descriptor())?);
    Ok(())
}

fn search_nodes(query: &str) -> Result<()> {
    let registry = registry()?;
    let hits = registry.search(query);
    if hits.is_empty() {
        println!("No operators match '{}'", query);
    }
    for id in hits {
        let name = registry.get_metadata(id).map(|m| m.name.as_str()).unwrap_or("");
        println!("{:<36} {}", id, name);
    }
    Ok(())
}

fn print_config() -> Result<()> {
    print!("{}", config::global().to_toml_string()?);
    Ok(())
}

fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    raw.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| anyhow!("expected <name>=<value>, got '{}'", raw))
}

// Scalar text converted to the declared type.
fn parse_scalar(ty: PortType, raw: &str) -> Result<Value> {
    let value = match ty {
        PortType::Integer => Value::Integer(raw.parse().with_context(|| format!("'{}' is not an integer", raw))?),
        PortType::Float => Value::Float(raw.parse().with_context(|| format!("'{}' is not a number", raw))?),
        PortType::Boolean => Value::Boolean(raw.parse().with_context(|| format!("'{}' is not true/false", raw))?),
        PortType::Color => Value::Color(
            Color::from_name(raw)
                .map(Ok)
                .unwrap_or_else(|| Color::from_hex(raw))
                .map_err(|e| anyhow!(e))?,
        ),
        PortType::String | PortType::Any => Value::string(raw),
        other => bail!("{} values cannot be given on the command line", other),
    };
    Ok(value)
}

fn load_input(ty: PortType, raw: &str) -> Result<Value> {
    match ty {
        PortType::Image => {
            let img = image::open(raw).with_context(|| format!("opening {}", raw))?;
            Ok(Value::Image(ImageTensor::from_frames(vec![dynamic_to_frame(&img)])?))
        }
        PortType::Mask => {
            let img = image::open(raw).with_context(|| format!("opening {}", raw))?;
            Ok(Value::Mask(dynamic_to_mask(&img)?))
        }
        other => parse_scalar(other, raw),
    }
}

fn save_output(dir: &Path, id: &str, port: &str, value: &Value) -> Result<()> {
    match value {
        Value::Image(images) => {
            for (i, frame) in images.frames().iter().enumerate() {
                let path = dir.join(format!("{}_{}_{:03}.png", id, port, i));
                frame_to_dynamic(frame.view())?
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("{}: wrote {}", port, path.display());
            }
        }
        Value::Mask(masks) => {
            for (i, plane) in masks.frames().iter().enumerate() {
                let path = dir.join(format!("{}_{}_{:03}.png", id, port, i));
                plane_to_gray(plane.view())
                    .save(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("{}: wrote {}", port, path.display());
            }
        }
        other => println!("{}:\n{}", port, describe(other)),
    }
    Ok(())
}

fn run_node(id: &str, args: &[String]) -> Result<()> {
    let registry = registry()?;
    let node = registry
        .create(id)
        .ok_or_else(|| anyhow!("Operator not found: {} (use 'list')", id))?;
    let meta = node.metadata();

    let mut invocation = Invocation::new(node.as_ref());
    let mut out_dir = PathBuf::from(".");
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter.next().ok_or_else(|| anyhow!("{} needs a value", flag))?;
        match flag.as_str() {
            "--param" => {
                let (name, raw) = split_assignment(value)?;
                let def = meta
                    .get_parameter(name)
                    .ok_or_else(|| anyhow!("{} has no parameter '{}'", id, name))?;
                invocation = invocation.with_parameter(name, parse_scalar(def.param_type, raw)?);
            }
            "--input" => {
                let (name, raw) = split_assignment(value)?;
                let port = meta
                    .get_input(name)
                    .ok_or_else(|| anyhow!("{} has no input '{}'", id, name))?;
                invocation = invocation.with_input(name, load_input(port.port_type, raw)?);
            }
            "--out" => out_dir = PathBuf::from(value),
            other => bail!("Unknown option: {}", other),
        }
    }

    log::info!("Running {} ({})", meta.id, meta.name);
    let outputs = invocation.run()?;
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    for name in meta.output_names() {
        if let Some(value) = outputs.get(name) {
            save_output(&out_dir, id, name, value)?;
        }
    }
    Ok(())
}
