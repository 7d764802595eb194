//! modrt inspector
//!
//! Loads a textual bytecode unit into a runtime module and explores it
//! interactively.

use std::process::ExitCode;
use std::rc::Rc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use modrt::bytecode::text::parse_unit;
use modrt::runtime::{
    RuntimeModule, RuntimeModuleFlags, can_generate_literal_hidden_class_cache_key,
};
use modrt::{Context, RootId};

const HELP: &str = "\
commands:
  info                      module summary and memory statistics
  string <id>               contents of string <id>
  symbol <id>               symbol of string <id>
  function <id>             materialize and describe function <id>
  literal <keybuf> <count>  look up (or populate) the literal shape cache
  deps                      lazy module tree
  gc                        run a collection
  epilogue                  epilogues of loaded modules
  quit                      exit";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <unit-file>", args[0]);
        return ExitCode::FAILURE;
    }
    let filename = &args[1];

    let source = match std::fs::read_to_string(filename) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", filename, e);
            return ExitCode::FAILURE;
        }
    };
    let unit = match parse_unit(&source) {
        Ok(unit) => unit,
        Err(e) => {
            eprintln!("{}: {}", filename, e);
            return ExitCode::FAILURE;
        }
    };

    let mut ctx = Context::new();
    let domain = ctx.create_domain();
    let domain_root = ctx.add_root(domain);
    let module = match RuntimeModule::create(
        &mut ctx,
        domain,
        unit.into_provider(),
        RuntimeModuleFlags::new(),
        filename.as_str(),
    ) {
        Ok(module) => module,
        Err(e) => {
            eprintln!("Error loading {}: {}", filename, e);
            return ExitCode::FAILURE;
        }
    };

    match run_repl(&mut ctx, &module, domain_root) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error reading input: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_repl(
    ctx: &mut Context,
    module: &Rc<RuntimeModule>,
    domain_root: RootId,
) -> Result<(), ReadlineError> {
    println!("modrt - runtime module inspector");
    println!("Type `help` for commands, Ctrl+D to exit.\n");

    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;

        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let args = match words.map(str::parse::<u32>).collect::<Result<Vec<_>, _>>() {
            Ok(args) => args,
            Err(_) => {
                println!("Error: arguments must be unsigned integers");
                continue;
            }
        };

        match (command, args.as_slice()) {
            ("help", []) => println!("{}", HELP),
            ("quit" | "exit", []) => return Ok(()),
            ("info", []) => info(ctx, module),
            ("string", [id]) if *id < module.string_count() => {
                println!("{:?}", module.get_string_from_string_id(ctx.identifiers_mut(), *id));
            }
            ("symbol", [id]) if *id < module.string_count() => {
                let symbol = module.get_symbol_id_from_string_id(ctx.identifiers_mut(), *id);
                println!("{:?}", symbol);
            }
            ("function", [id]) if *id < module.code_block_count() => {
                let block = module.get_code_block(ctx, *id);
                let name = module.get_string_from_string_id(ctx.identifiers_mut(), block.name());
                println!(
                    "{} params={} frame={} lazy={} owned={} bytes={}",
                    name,
                    block.param_count(),
                    block.frame_size(),
                    block.is_lazy(),
                    block.is_owned_by(module),
                    block.bytecode().map_or(0, |b| b.len())
                );
            }
            ("literal", [key_buffer, count]) => literal(ctx, module, *key_buffer, *count),
            ("deps", []) => print_dependents(module, 0),
            ("gc", []) => {
                let stats = ctx.collect();
                println!(
                    "cells {} -> {}, {} bytes freed, {} moved, {} weak cleared",
                    stats.cells_before,
                    stats.cells_after,
                    stats.bytes_freed,
                    stats.cells_moved,
                    stats.weak_cleared
                );
                if ctx.root::<modrt::Domain>(domain_root).is_none() {
                    println!("warning: domain lost");
                }
            }
            ("epilogue", []) => {
                for epilogue in ctx.epilogues() {
                    println!("{}", String::from_utf8_lossy(&epilogue));
                }
            }
            ("string" | "symbol" | "function", [id]) => {
                println!("Error: index {} out of range", id)
            }
            _ => println!("Error: unknown command `{}` (try `help`)", line),
        }
        ctx.maybe_collect();
    }
}

fn info(ctx: &Context, module: &RuntimeModule) {
    println!("source:    {}", module.source_url());
    println!("state:     {:?}", module.state());
    println!("strings:   {}", module.string_count());
    println!("functions: {}", module.code_block_count());
    println!(
        "cjs:       dynamic={} static={}",
        module.has_cjs_modules(),
        module.has_cjs_modules_static()
    );
    println!("{:#?}", ctx.memory_stats());
}

fn literal(ctx: &mut Context, module: &RuntimeModule, key_buffer: u32, count: u32) {
    if !can_generate_literal_hidden_class_cache_key(key_buffer, count) {
        println!("not cacheable");
        return;
    }
    match module.find_cached_literal_hidden_class(ctx.heap(), key_buffer, count) {
        Some(class) => println!("hit: {:?}", class),
        None => {
            let class = ctx.alloc_hidden_class(None, &[]);
            module.try_cache_literal_hidden_class(key_buffer, count, class);
            println!("miss: cached {:?}", class);
        }
    }
}

fn print_dependents(module: &RuntimeModule, depth: usize) {
    for child in module.dependents().iter() {
        let functions = child.code_block_count();
        println!("{:indent$}- lazy module ({} functions)", "", functions, indent = depth * 2);
        print_dependents(child, depth + 1);
    }
}
