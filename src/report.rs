use crate::config::{StackConfig, Status};
use crate::errors::Result;

/// Render the stack as a markdown bullet list, one feature per line:
/// status glyph, branch name, optional summary, and a PR link or a link to
/// the branch derived from the remote URL.
pub fn render(config: &StackConfig) -> Result<String> {
    let mut out = String::new();
    for feature in &config.features {
        let url = config.remote_url(&feature.remote)?;
        let mut line = format!("* {} `{}`", status_glyph(&feature.status), feature.name);
        if let Some(summary) = &feature.summary {
            line.push_str(": ");
            line.push_str(summary);
        }
        if let Some(pr) = &feature.pr {
            line.push_str(&format!(" [(PR link)]({pr})"));
        } else if let Some(base) = branch_url(url) {
            line.push_str(&format!(" [(Branch link)]({base}{})", feature.name));
        }
        line.push('\n');
        out.push_str(&line);
    }
    Ok(out)
}

fn status_glyph(status: &Status) -> &'static str {
    match status {
        Status::Integrated => "\u{1f7e2}", // green circle
        Status::Merging => "\u{1f504}",    // arrows
        Status::Pending => "\u{23f3}",     // hourglass
        Status::Other(_) => "\u{2754}",    // question mark
    }
}

/// Browsable prefix for branches of a remote, when one can be derived.
fn branch_url(remote_url: &str) -> Option<String> {
    if remote_url.contains("https://") {
        Some(remote_url.replace(".git", "/tree/"))
    } else if remote_url.starts_with("git@github.com:") {
        Some(
            remote_url
                .replace("git@github.com:", "https://github.com/")
                .replace(".git", "/tree/"),
        )
    } else {
        None
    }
}
