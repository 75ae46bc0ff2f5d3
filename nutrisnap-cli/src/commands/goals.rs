use clap::{Args, Subcommand};
use nutrisnap_core::MacroGoals;

use crate::session::Session;

#[derive(Args)]
pub struct GoalsCommand {
    #[command(subcommand)]
    pub command: GoalsSubcommand,
}

#[derive(Subcommand)]
pub enum GoalsSubcommand {
    /// Show daily macro goals
    Show,

    /// Change daily macro goals; omitted values are kept
    Set {
        #[arg(long)]
        calories: Option<f64>,
        #[arg(long)]
        protein: Option<f64>,
        #[arg(long)]
        carbs: Option<f64>,
        #[arg(long)]
        fat: Option<f64>,
    },
}

impl GoalsCommand {
    pub async fn run(&self, session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            GoalsSubcommand::Show => {
                print_goals(&session.coordinator.goals());
                Ok(())
            }
            GoalsSubcommand::Set {
                calories,
                protein,
                carbs,
                fat,
            } => {
                let current = session.coordinator.goals();
                let goals = MacroGoals::new(
                    calories.unwrap_or(current.calories),
                    protein.unwrap_or(current.protein),
                    carbs.unwrap_or(current.carbs),
                    fat.unwrap_or(current.fat),
                );
                for value in [goals.calories, goals.protein, goals.carbs, goals.fat] {
                    if value < 0.0 {
                        return Err("Goals cannot be negative".into());
                    }
                }

                session.coordinator.set_goals(goals).await;
                println!("Goals updated:");
                print_goals(&goals);
                Ok(())
            }
        }
    }
}

fn print_goals(goals: &MacroGoals) {
    println!("  Calories: {:.0} kcal", goals.calories);
    println!("  Protein:  {:.0} g", goals.protein);
    println!("  Carbs:    {:.0} g", goals.carbs);
    println!("  Fat:      {:.0} g", goals.fat);
}
