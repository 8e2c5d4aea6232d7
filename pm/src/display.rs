//! Plain-text tables and panels for terminal output

use colored::Colorize;

use crate::crew::{FullWorkflowOutcome, WorkflowOutcome};

/// Left-aligned table with a dashed rule under the header
#[derive(Debug, Clone, Default)]
pub struct Table {
    title: Option<String>,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            title: None,
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a row; missing cells render empty and extra cells are dropped
    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cells: Vec<String> = cells.into_iter().map(Into::into).collect();
        cells.resize(self.headers.len(), String::new());
        self.rows.push(cells);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }
        widths
    }

    /// Render without color
    pub fn render(&self) -> String {
        let widths = self.widths();
        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:<w$}", c, w = *w))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = String::new();
        if let Some(title) = &self.title {
            out.push_str(title);
            out.push('\n');
        }
        out.push_str(&line(&self.headers));
        out.push('\n');
        let rule = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        out.push_str(&"-".repeat(rule));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&line(row));
            out.push('\n');
        }
        out
    }

    pub fn print(&self) {
        let rendered = self.render();
        let mut lines = rendered.lines();
        if self.title.is_some()
            && let Some(title) = lines.next()
        {
            println!("{}", title.bright_cyan().bold());
        }
        if let Some(header) = lines.next() {
            println!("{}", header.bold());
        }
        for line in lines {
            println!("{}", line);
        }
    }
}

/// Boxed panel, used for the welcome banner
pub fn panel(title: &str, lines: &[String]) -> String {
    let width = lines
        .iter()
        .map(|l| l.chars().count())
        .chain(std::iter::once(title.chars().count()))
        .max()
        .unwrap_or(0)
        + 2;
    let mut out = format!("┌{}┐\n", "─".repeat(width));
    out.push_str(&format!("│ {:<w$} │\n", title, w = width - 2));
    out.push_str(&format!("├{}┤\n", "─".repeat(width)));
    for line in lines {
        out.push_str(&format!("│ {:<w$} │\n", line, w = width - 2));
    }
    out.push_str(&format!("└{}┘", "─".repeat(width)));
    out
}

/// Cut to `max` characters, marking the cut with `...`
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max).collect();
    format!("{}...", kept)
}

/// One line for a finished workflow, plus the agent's text when `verbose`
pub fn print_outcome(outcome: &WorkflowOutcome, verbose: bool) {
    if outcome.success {
        println!("{} {}", "✅".green(), outcome.message.green());
    } else {
        println!("{} {}", "❌".red(), outcome.message.red());
    }
    for item in &outcome.dispatched {
        if let Some(url) = item.get("url").and_then(|u| u.as_str()) {
            println!("   {}", url.dimmed());
        }
    }
    if verbose && let Some(output) = &outcome.agent_output {
        println!("\n{} {}", output.agent.bold(), "said:".dimmed());
        println!("{}", output.response);
    }
}

pub fn print_full_outcome(outcome: &FullWorkflowOutcome) {
    if outcome.overall_success {
        println!("{}", "✅ All workflows completed successfully!".green());
    } else {
        println!("{}", "⚠️ Some workflows had issues:".yellow());
    }
    for workflow in &outcome.workflows {
        let icon = if workflow.success { "✅" } else { "❌" };
        println!("  {} {:<14} {}", icon, workflow.workflow, workflow.message);
    }
}
