use clap::{Args, Subcommand};
use nutrisnap_core::FoodItem;

use super::{format_entry, parse_date, OutputFormat};
use crate::session::Session;

#[derive(Args)]
pub struct LogCommand {
    #[command(subcommand)]
    pub command: LogSubcommand,
}

#[derive(Subcommand)]
pub enum LogSubcommand {
    /// Log a food by hand
    Add {
        /// Food name
        name: String,

        #[arg(long, default_value_t = 0.0)]
        calories: f64,

        /// Protein in grams
        #[arg(long, default_value_t = 0.0)]
        protein: f64,

        /// Carbohydrates in grams
        #[arg(long, default_value_t = 0.0)]
        carbs: f64,

        /// Fat in grams
        #[arg(long, default_value_t = 0.0)]
        fat: f64,

        /// Portion description, e.g. "1 cup"
        #[arg(long, default_value = "")]
        portion: String,

        /// Day to log on (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,
    },

    /// List the entries of a day
    List {
        /// Day (YYYY-MM-DD), defaults to today
        #[arg(long, short)]
        date: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove an entry by id
    Remove {
        id: String,

        /// Day the entry was logged on (YYYY-MM-DD), needed for entries on this device
        #[arg(long, short)]
        date: Option<String>,
    },
}

impl LogCommand {
    pub async fn run(&self, session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            LogSubcommand::Add {
                name,
                calories,
                protein,
                carbs,
                fat,
                portion,
                date,
            } => {
                if let Some(day) = parse_date(date)? {
                    session.coordinator.select_date(day);
                }
                let item = FoodItem::new(name.as_str())
                    .with_macros(*calories, *protein, *carbs, *fat)
                    .with_portion(portion.as_str());
                session.coordinator.add_entries(&[item]).await;

                println!("Logged on {}:", session.coordinator.selected_date());
                if let Some(entry) = session.coordinator.entries().last() {
                    println!("  {}", format_entry(entry));
                    if let Some(id) = &entry.id {
                        println!("  ID: {}", id);
                    }
                }
                Ok(())
            }

            LogSubcommand::List { date, format } => {
                if let Some(day) = parse_date(date)? {
                    session.coordinator.select_date(day);
                }
                let entries = session.coordinator.entries_for_selected_day();

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&entries)?);
                    }
                    OutputFormat::Text => {
                        let day = session.coordinator.selected_date();
                        if entries.is_empty() {
                            println!("Nothing logged on {}", day);
                            return Ok(());
                        }
                        println!("{}", day);
                        println!("{}", "-".repeat(60));
                        for entry in &entries {
                            println!("  {}", format_entry(entry));
                            if let Some(id) = &entry.id {
                                println!("         {}", id);
                            }
                        }
                        let noun = if entries.len() == 1 { "entry" } else { "entries" };
                        println!("\nTotal: {} {}", entries.len(), noun);
                    }
                }
                Ok(())
            }

            LogSubcommand::Remove { id, date } => {
                if let Some(day) = parse_date(date)? {
                    session.coordinator.select_date(day);
                }
                if session.coordinator.remove_entry(id).await {
                    println!("Removed entry {}", id);
                    Ok(())
                } else {
                    Err(format!(
                        "Entry not found on {}: {}",
                        session.coordinator.selected_date(),
                        id
                    )
                    .into())
                }
            }
        }
    }
}
