use geospread::execution_stats::print_execution_statistics;
use geospread::runner::run_with_args;
use geospread::{ContextPopulationExt, Role};

fn main() -> anyhow::Result<()> {
    let (context, statistics) = run_with_args(|_, _| Ok(()))?;

    for role in [Role::Susceptible, Role::Infectious, Role::Removed] {
        println!("{:<25}{}", format!("Final {role}:"), context.get_role_count(role));
    }
    print_execution_statistics(&statistics);
    Ok(())
}
