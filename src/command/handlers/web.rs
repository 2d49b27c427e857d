//! Website and search handlers

use super::{argument, perform, HandlerContext};
use crate::actuator::Action;
use crate::command::CommandResult;
use devlink_shared::CommandEnvelope;

/// Build the results URL for a search; spaces in the query become `+`
pub fn search_url(platform: &str, content: &str) -> Option<String> {
    let query = content.trim().replace(' ', "+");
    match platform.trim().to_ascii_lowercase().as_str() {
        "google" => Some(format!("https://www.google.com/search?q={}", query)),
        "youtube" => Some(format!(
            "https://www.youtube.com/results?search_query={}",
            query
        )),
        _ => None,
    }
}

/// Handle WebsiteControl: open a full http(s) URL
pub async fn handle_website_control(
    ctx: &HandlerContext,
    command: &CommandEnvelope,
) -> CommandResult {
    let url = argument(command, "websiteUrl").trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return CommandResult::Rejected {
            message: format!("'{}' is not a full http(s) URL", url),
        };
    }

    perform(ctx, Action::OpenUrl(url.to_string())).await
}

/// Handle SearchControl: search Google or YouTube and open the results
pub async fn handle_search_control(
    ctx: &HandlerContext,
    command: &CommandEnvelope,
) -> CommandResult {
    let platform = argument(command, "searchPlatform");
    let Some(url) = search_url(platform, argument(command, "searchContent")) else {
        return CommandResult::Rejected {
            message: format!("Unsupported search platform '{}'", platform),
        };
    };

    perform(ctx, Action::OpenUrl(url)).await
}
