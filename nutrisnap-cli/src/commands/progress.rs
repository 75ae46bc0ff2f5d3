use clap::Args;
use nutrisnap_core::MacroProgress;

use super::{parse_date, OutputFormat};
use crate::session::Session;

const BAR_WIDTH: usize = 30;

#[derive(Args)]
pub struct ProgressCommand {
    /// Day (YYYY-MM-DD), defaults to today
    #[arg(long, short)]
    date: Option<String>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl ProgressCommand {
    pub async fn run(&self, session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(day) = parse_date(&self.date)? {
            session.coordinator.select_date(day);
        }
        let progress = session.coordinator.progress();

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&progress)?),
            OutputFormat::Text => {
                println!("Progress for {}", session.coordinator.selected_date());
                println!("{}", "-".repeat(60));
                print_row("Calories", &progress.calories, "kcal");
                print_row("Protein", &progress.protein, "g");
                print_row("Carbs", &progress.carbs, "g");
                print_row("Fat", &progress.fat, "g");
            }
        }
        Ok(())
    }
}

fn print_row(label: &str, progress: &MacroProgress, unit: &str) {
    println!(
        "  {:9} {} {:>5.0}/{:.0} {} ({:.0}%)",
        label,
        bar(progress.percent()),
        progress.consumed,
        progress.goal,
        unit,
        progress.percent()
    );
}

fn bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar() {
        assert_eq!(bar(0.0), format!("[{}]", ".".repeat(BAR_WIDTH)));
        assert_eq!(bar(100.0), format!("[{}]", "#".repeat(BAR_WIDTH)));
        assert_eq!(bar(50.0).matches('#').count(), BAR_WIDTH / 2);
    }
}
