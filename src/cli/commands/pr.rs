use crate::cli::output::Output;
use crate::cli::PrAction;
use crate::errors::Result;
use crate::stack::{PrInfo, RestackScope, StackManager};

use super::{current_or, open_initialized};

pub fn run(action: PrAction) -> Result<()> {
    let repo = open_initialized()?;
    let manager = StackManager::new(&repo)?;

    match action {
        PrAction::Set {
            branch,
            number,
            state,
            base,
        } => {
            let info = PrInfo {
                number,
                state: state.parse()?,
                base,
            };
            manager.set_pr_info(&branch, Some(info))?;
            Output::success(format!("Recorded PR #{number} for {}", Output::branch(&branch)));
            if manager.store().pr_base_mismatch(&branch) {
                Output::warning("The PR base differs from the branch's parent");
            }
        }
        PrAction::Clear { branch } => {
            manager.set_pr_info(&branch, None)?;
            Output::success(format!("Cleared PR for {}", Output::branch(&branch)));
        }
        PrAction::Blockers { branch } => {
            let branch = current_or(&manager, branch)?;
            let blockers = manager.submit_blockers(&branch, RestackScope::Stack)?;
            if blockers.is_empty() {
                Output::success("No merged or closed pull requests in this stack");
            } else {
                Output::warning("These branches have pull requests that are no longer open:");
                for (name, state) in blockers {
                    Output::bullet(format!("{} ({})", Output::branch(&name), state));
                }
                Output::tip("Run 'bst sync --delete' to remove them and restack");
            }
        }
    }
    Ok(())
}
