use std::path::PathBuf;

use clap::Args;
use nutrisnap_core::{ClassifierError, FoodClassifier, FoodImage, FoodItem, NoticeKind};

use super::parse_date;
use crate::config::Config;
use crate::session::{classifier, Session};

#[derive(Args)]
pub struct SearchCommand {
    /// Food to look up, e.g. "banana"
    query: String,

    /// Log the result
    #[arg(long)]
    add: bool,

    /// Day to log on (YYYY-MM-DD), defaults to today
    #[arg(long, short)]
    date: Option<String>,
}

impl SearchCommand {
    pub fn needs_session(&self) -> bool {
        self.add
    }

    pub async fn run(
        &self,
        config: &Config,
        session: Option<&mut Session>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err("Search query cannot be empty".into());
        }
        let date = parse_date(&self.date)?;

        let found = match classifier(config)?.search(query).await {
            Ok(found) => found,
            Err(e) => return classifier_failed(session, e),
        };
        let item = found.ok_or_else(|| format!("No match for '{}'", query))?;
        print_items(std::slice::from_ref(&item));

        if let Some(session) = session {
            log_items(session, date, &[item]).await;
        }
        Ok(())
    }
}

#[derive(Args)]
pub struct AnalyzeCommand {
    /// Meal photo (jpg, png, webp, gif or heic)
    image: PathBuf,

    /// Log every recognized item
    #[arg(long)]
    add: bool,

    /// Day to log on (YYYY-MM-DD), defaults to today
    #[arg(long, short)]
    date: Option<String>,
}

impl AnalyzeCommand {
    pub fn needs_session(&self) -> bool {
        self.add
    }

    pub async fn run(
        &self,
        config: &Config,
        session: Option<&mut Session>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let date = parse_date(&self.date)?;
        let image = FoodImage::from_path(&self.image)?;

        println!("Analyzing {}...", self.image.display());
        let items = match classifier(config)?.analyze(&image).await {
            Ok(items) => items,
            Err(e) => return classifier_failed(session, e),
        };
        if items.is_empty() {
            println!("No food recognized.");
            return Ok(());
        }
        print_items(&items);

        if let Some(session) = session {
            log_items(session, date, &items).await;
        }
        Ok(())
    }
}

/// While logging, a classifier failure becomes a notice and the command
/// logs nothing. A plain lookup reports it as an error.
fn classifier_failed(
    session: Option<&mut Session>,
    error: ClassifierError,
) -> Result<(), Box<dyn std::error::Error>> {
    match session {
        Some(session) => {
            session.raise(
                NoticeKind::Classifier,
                format!("Food recognition failed, nothing was logged ({})", error),
                &error,
            );
            Ok(())
        }
        None => Err(error.into()),
    }
}

fn print_items(items: &[FoodItem]) {
    for item in items {
        println!("  {}", item);
    }
}

async fn log_items(session: &mut Session, date: Option<chrono::NaiveDate>, items: &[FoodItem]) {
    if let Some(day) = date {
        session.coordinator.select_date(day);
    }
    session.coordinator.add_entries(items).await;
    println!(
        "\nLogged {} item(s) on {}",
        items.len(),
        session.coordinator.selected_date()
    );
}
