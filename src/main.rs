// SPDX-License-Identifier: GPL-2.0

//! Command-line front end
//!
//! `bpf-absint PROGRAM [TYPE] [DOMAIN]` verifies the eBPF code in
//! PROGRAM, assuming program type TYPE, using the named numeric
//! domain. Exit codes: 0 verified, 1 verification failed, 64 usage
//! error, 65 I/O error, 2 malformed input.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use bpf_absint::log::{LogLevel, VerifierLog};
use bpf_absint::loader::load_programs;
use bpf_absint::spec::ProgType;
use bpf_absint::verifier::{verify_records, DomainName, VerifierOptions};

#[derive(Parser, Debug)]
#[command(
    name = "bpf-absint",
    about = "Verify eBPF programs by abstract interpretation"
)]
struct Cli {
    /// Program file: a relocatable ELF object or a raw instruction dump
    program: PathBuf,

    /// Program type (a name like `xdp`, an index, or `typeN`);
    /// derived from the section name or defaulted when omitted
    prog_type: Option<String>,

    /// Numeric domain to analyze with
    #[arg(default_value = "sdbm-arr")]
    domain: String,

    /// Only verify the named ELF section
    #[arg(long)]
    section: Option<String>,

    /// Do not print per-label invariants
    #[arg(long)]
    no_print_invariants: bool,

    /// Do not print the failure report
    #[arg(long)]
    no_print_failures: bool,

    /// Report loop heads whose iteration count cannot be bounded
    #[arg(long)]
    termination: bool,

    /// Print fixpoint statistics
    #[arg(long)]
    stats: bool,
}

const EXIT_FAILED: u8 = 1;
const EXIT_MALFORMED: u8 = 2;
const EXIT_USAGE: u8 = 64;

fn usage(msg: &str) -> ExitCode {
    eprintln!("{}", msg);
    eprintln!("available domains:");
    for (name, desc) in DomainName::descriptions() {
        eprintln!("\t{} - {}", name, desc);
    }
    ExitCode::from(EXIT_USAGE)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version requests are not usage errors.
            if e.use_stderr() {
                eprint!("{}", e);
                return ExitCode::from(EXIT_USAGE);
            }
            print!("{}", e);
            return ExitCode::SUCCESS;
        }
    };

    let Some(domain) = DomainName::parse(&cli.domain) else {
        return usage(&format!("argument {} is not a valid domain", cli.domain));
    };

    let type_override = match &cli.prog_type {
        None => None,
        Some(s) => match ProgType::parse(s) {
            Ok(t) => Some(t),
            Err(e) => return usage(&e.to_string()),
        },
    };

    let programs = match load_programs(&cli.program, cli.section.as_deref(), type_override) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    let options = VerifierOptions {
        print_invariants: !cli.no_print_invariants,
        print_failures: !cli.no_print_failures,
        check_termination: cli.termination,
    };
    let level = if options.print_invariants {
        LogLevel::Info
    } else {
        LogLevel::Error
    };

    let mut all_passed = true;
    for prog in &programs {
        if !prog.section.is_empty() {
            println!("section {}:", prog.section);
        }
        let mut log = VerifierLog::new(level);
        match verify_records(&prog.records, &prog.info, domain, &options, &mut log) {
            Ok(result) => {
                print!("{}", log.contents());
                if cli.stats {
                    println!(
                        "labels: {}, instructions: {}, iterations: {}, widenings: {}",
                        result.stats.labels,
                        result.stats.instructions,
                        result.stats.iterations,
                        result.stats.widenings
                    );
                }
                if !result.passed {
                    println!("verification failed");
                    all_passed = false;
                }
            }
            Err(e) => {
                eprintln!("trivial verification failure: {}", e);
                return ExitCode::from(EXIT_MALFORMED);
            }
        }
    }

    if all_passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    }
}
