//! `rotator test-password`: generate and score, no network.

use rotator_credential::RotatorConfig;
use rotator_credential::password::{PasswordGenerator, PasswordPolicy, StrengthReport};
use serde::Serialize;
use std::fmt::Write as _;
use std::process::ExitCode;

use crate::cli::TestPasswordArgs;

#[derive(Debug, Serialize)]
struct Sample {
    password: String,
    length: usize,
    #[serde(flatten)]
    report: StrengthReport,
}

pub fn run(config: &RotatorConfig, args: &TestPasswordArgs) -> anyhow::Result<ExitCode> {
    let policy = PasswordPolicy::new(config.password.clone())?;
    let samples: Vec<Sample> = (0..args.count)
        .map(|_| {
            let candidate = policy.generate();
            Sample {
                password: candidate.secret().expose_secret(str::to_string),
                length: candidate.len(),
                report: candidate.strength().clone(),
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
    } else {
        let blocks: Vec<String> = samples.iter().map(render).collect();
        print!("{}", blocks.join("\n"));
    }
    Ok(ExitCode::SUCCESS)
}

fn render(sample: &Sample) -> String {
    let report = &sample.report;
    let mut out = String::new();
    let _ = writeln!(out, "Password: {}", sample.password);
    let _ = writeln!(out, "Length:   {}", sample.length);
    let _ = writeln!(
        out,
        "Strength: {} ({}/{})",
        report.strength, report.points, report.max_points
    );
    for criterion in &report.breakdown {
        let mark = if criterion.met { 'x' } else { ' ' };
        let _ = writeln!(out, "  [{mark}] {} (+{})", criterion.label, criterion.points);
    }
    out
}
