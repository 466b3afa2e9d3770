//! Interface de terminal do presswright: spinner e saída colorida.
//!
//! Usa `indicatif` para o spinner durante a execução e `console` para
//! colorir o relatório final de cada item.

use std::collections::BTreeMap;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::ProjectConfig;
use crate::content::WorkStatus;
use crate::orchestrator::{ItemOutcome, RunReport};

/// Spinner exibido enquanto o orquestrador trabalha.
pub struct RunProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl RunProgress {
    /// Inicia o spinner com a mensagem informada.
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }

    /// Finaliza o spinner e imprime uma linha por item e o resumo.
    pub fn finish(&self, report: &RunReport) {
        self.pb.finish_and_clear();

        for item in &report.items {
            let score = item
                .final_score
                .map(|s| format!(" score {s:.1}"))
                .unwrap_or_default();
            let detail = format!(
                "{} [{}]{} ({} iterations)",
                item.title, item.project_id, score, item.iterations
            );
            match &item.outcome {
                ItemOutcome::Published { url } => println!(
                    "  {} {detail} -> {}",
                    self.green.apply_to("✓"),
                    url.as_deref().unwrap_or("(no url)")
                ),
                ItemOutcome::Generated => {
                    println!("  {} {detail} generated", self.green.apply_to("✎"))
                }
                ItemOutcome::Rescheduled {
                    retry_count,
                    scheduled_for,
                    error,
                } => println!(
                    "  {} {detail} retry {retry_count} on {}: {error}",
                    self.yellow.apply_to("↻"),
                    scheduled_for.format("%Y-%m-%d")
                ),
                ItemOutcome::Failed { kind, error } => {
                    println!("  {} {detail} {kind}: {error}", self.red.apply_to("✗"))
                }
                ItemOutcome::Skipped { reason } => {
                    println!("  {} {detail} skipped: {reason}", self.dim.apply_to("-"))
                }
            }
        }

        println!();
        println!(
            "{} published, {} generated, {} rescheduled, {} failed, {} skipped{}",
            self.green.apply_to(report.published()),
            report.generated(),
            self.yellow.apply_to(report.rescheduled()),
            self.red.apply_to(report.failed()),
            report.skipped(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
    }
}

/// Imprime projetos e contagem de itens por status.
pub fn print_status(projects: &[ProjectConfig], counts: &BTreeMap<WorkStatus, usize>) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();

    println!("{}", bold.apply_to("Projects"));
    if projects.is_empty() {
        println!("  {}", dim.apply_to("(none)"));
    }
    for project in projects {
        let state = if project.active { "active" } else { "inactive" };
        println!(
            "  {} {} [{}]",
            project.id,
            dim.apply_to(state),
            project.platform_id()
        );
    }

    println!("{}", bold.apply_to("Work items"));
    for status in [
        WorkStatus::Pending,
        WorkStatus::Processing,
        WorkStatus::Published,
        WorkStatus::Failed,
    ] {
        println!(
            "  {:<10} {}",
            status.to_string(),
            counts.get(&status).copied().unwrap_or_default()
        );
    }
}
