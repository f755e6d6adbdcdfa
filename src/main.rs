use std::fmt;
use std::path::{Path, PathBuf};

use bitcoin::hex::DisplayHex;
use clap::Parser;

use sv_scriptexec::asm::ScriptAsm;
use sv_scriptexec::flags::UTXO_AFTER_GENESIS;
use sv_scriptexec::json::{RunResult, RunStep};
use sv_scriptexec::*;

#[derive(Parser)]
#[command(version, about)]
struct Args {
	/// filepath to the locking script ASM file
	#[arg(required = true)]
	script_path: PathBuf,
	/// filepath to the unlocking script ASM file
	#[arg(long)]
	unlock: Option<PathBuf>,
	/// verification flags, as hex bits or "standard"
	#[arg(long, default_value = "standard")]
	flags: String,
	/// spend the locking script as a UTXO created before Genesis
	#[arg(long)]
	pre_genesis: bool,
	/// apply consensus instead of policy limits
	#[arg(long)]
	consensus: bool,
	/// filepath to a JSON file with policy limits
	#[arg(long)]
	config: Option<PathBuf>,
	/// Whether to print debug info
	#[arg(long)]
	debug: bool,
	/// Whether to output result in JSON
	#[arg(long)]
	json: bool,
}

struct FmtStack<'a>(&'a Vec<Vec<u8>>);
impl<'a> fmt::Display for FmtStack<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let mut iter = self.0.iter().rev().peekable();
		while let Some(item) = iter.next() {
			write!(f, "<{}>", item.as_hex())?;
			if iter.peek().is_some() {
				write!(f, " ")?;
			}
		}
		Ok(())
	}
}

fn read_program(path: &Path) -> Result<Program, String> {
	let asm = std::fs::read_to_string(path)
		.map_err(|e| format!("error reading script file {}: {}", path.display(), e))?;
	Program::from_asm(&asm).map_err(|e| format!("error parsing {}: {}", path.display(), e))
}

fn parse_flags(s: &str, pre_genesis: bool) -> Result<ScriptFlags, String> {
	if s == "standard" {
		return Ok(ScriptFlags::standard(true, !pre_genesis));
	}
	let bits = u32::from_str_radix(s.trim_start_matches("0x"), 16)
		.map_err(|e| format!("invalid flags {}: {}", s, e))?;
	let bits = if pre_genesis { bits & !UTXO_AFTER_GENESIS } else { bits };
	ScriptFlags::from_bits(bits).map_err(|e| e.to_string())
}

fn inner_main() -> Result<(), String> {
	let args = Args::parse();

	let lock = read_program(&args.script_path)?;
	let unlock = match args.unlock {
		Some(ref path) => read_program(path)?,
		None => Program::new(),
	};
	let flags = parse_flags(&args.flags, args.pre_genesis)?;

	let mut options = Options { consensus: args.consensus, ..Default::default() };
	if let Some(ref path) = args.config {
		let json = std::fs::read_to_string(path)
			.map_err(|e| format!("error reading config file {}: {}", path.display(), e))?;
		options.config = serde_json::from_str(&json)
			.map_err(|e| format!("error parsing config file {}: {}", path.display(), e))?;
	}

	let start = std::time::Instant::now();
	let mut exec = Exec::from_programs(&unlock, &lock, flags, options, NoSignatureCheck)
		.map_err(|e| format!("error creating exec: {}", e))?;

	const SEP: &str = "--------------------------------------------------";
	if !args.json {
		println!("Flags: {}", flags);
		println!("{}", SEP);
	}
	loop {
		if args.debug {
			if args.json {
				let step = RunStep {
					phase: exec.phase(),
					remaining_script: exec.remaining_script(),
					stack: exec.stack(),
					altstack: exec.altstack(),
					stats: Some(exec.stats()),
				};
				println!("{}", serde_json::to_string(&step).map_err(|e| e.to_string())?);
			} else {
				println!("Phase: {}", exec.phase());
				println!("Remaining script: {}", ScriptAsm(exec.remaining_script()));
				println!("Stack: {}", exec.stack());
				println!("AltStack: {}", exec.altstack());
				println!("{}", SEP);
			}
		}

		if exec.exec_next().is_err() {
			break;
		}
	}

	let res = exec.result().ok_or("execution did not finish")?.clone();
	if args.json {
		let out = RunResult::new(&res, Some(exec.stats()));
		println!("{}", serde_json::to_string(&out).map_err(|e| e.to_string())?);
		return Ok(());
	}

	println!("Execution ended. Success: {}", res.success);
	println!("Final stack: {}", FmtStack(&res.final_stack));
	if !res.success {
		if let Some(op) = res.opcode {
			println!("Failed on opcode: {}", op);
		}
		if let Some(err) = res.error {
			println!("Error: {} ({:?}) in {} script", err, err, res.phase);
		}
	}
	println!("Stats:\n{:#?}", exec.stats());
	println!("Time elapsed: {}ms", start.elapsed().as_millis());
	Ok(())
}

fn main() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

	if let Err(e) = inner_main() {
		eprintln!("ERROR: {}", e);
		std::process::exit(1);
	}
}
