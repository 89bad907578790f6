//! Prompt compiler: policy + run-time facts -> one analysis request
//!
//! Output is a pure function of its inputs, so identical policy and facts
//! always compile to byte-identical requests.

use approver_core::{AnalysisRequest, GitInfo, PromptPolicy};

/// Substituted for `{tool_list}` when the analyzer advertises nothing.
pub const NO_TOOLS: &str = "No tools available (fallback mode)";

const ATTENTION_HEADING: &str = "\nAdditionally, pay close attention to the following:";
const CONSIDER_HEADING: &str = "\nConsider:";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("template references unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("malformed template at byte {position}: {reason}")]
    Malformed { position: usize, reason: &'static str },
}

/// Run-time facts about the task under review.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptFacts {
    pub pipeline_run_name: String,
    pub pipeline_name: String,
    pub description: String,
    pub capability_names: Vec<String>,
    pub repository: Option<GitInfo>,
}

impl PromptFacts {
    /// Value of a rule field. Unknown fields read as empty.
    pub fn field(&self, name: &str) -> &str {
        match name {
            "pipeline_run_name" => &self.pipeline_run_name,
            "pipeline_name" => &self.pipeline_name,
            "description" => &self.description,
            _ => "",
        }
    }

    fn tool_list(&self) -> String {
        if self.capability_names.is_empty() {
            NO_TOOLS.to_string()
        } else {
            self.capability_names.join(", ")
        }
    }

    fn placeholder(&self, name: &str) -> Option<String> {
        match name {
            "pipeline_run_name" | "pipeline_name" | "description" => {
                Some(self.field(name).to_string())
            }
            "tool_list" => Some(self.tool_list()),
            _ => None,
        }
    }
}

/// Compile the analysis request.
pub fn compile(policy: &PromptPolicy, facts: &PromptFacts) -> Result<AnalysisRequest, PromptError> {
    let mut parts: Vec<String> = Vec::new();

    if !policy.base_template.is_empty() {
        parts.push(render_template(&policy.base_template, facts)?);
    }

    match &facts.repository {
        Some(repo) => parts.push(repository_section(repo)),
        None if !policy.missing_context_notice.is_empty() => {
            parts.push(render_template(&policy.missing_context_notice, facts)?);
        }
        None => {}
    }

    let matched = matched_instructions(policy, facts);
    if !matched.is_empty() {
        parts.push(ATTENTION_HEADING.to_string());
        parts.extend(matched.into_iter().map(|i| format!("- {}", i)));
    }

    if !policy.considerations.is_empty() {
        parts.push(CONSIDER_HEADING.to_string());
        parts.extend(policy.considerations.iter().map(|c| format!("- {}", c)));
    }

    if !policy.output_format_instruction.is_empty() {
        parts.push(policy.output_format_instruction.clone());
    }

    Ok(AnalysisRequest::new(parts.join("\n")))
}

/// Check a policy's templates at startup, before any task arrives.
pub fn validate(policy: &PromptPolicy) -> Result<(), PromptError> {
    let facts = PromptFacts::default();
    render_template(&policy.base_template, &facts)?;
    render_template(&policy.missing_context_notice, &facts)?;
    Ok(())
}

/// Instructions of every matching rule, in rule order.
pub fn matched_instructions<'p>(policy: &'p PromptPolicy, facts: &PromptFacts) -> Vec<&'p str> {
    policy
        .rules
        .iter()
        .filter(|rule| !rule.contains.is_empty() && !rule.instruction.is_empty())
        .filter(|rule| {
            facts
                .field(&rule.field)
                .to_lowercase()
                .contains(&rule.contains.to_lowercase())
        })
        .map(|rule| rule.instruction.as_str())
        .collect()
}

fn repository_section(repo: &GitInfo) -> String {
    format!(
        "\nREPOSITORY INFORMATION TO ANALYZE:\nRepository: {}/{}\nBranch/Revision: {}\nGit URL: {}\n",
        repo.owner,
        repo.repo,
        repo.revision.as_deref().unwrap_or("unknown"),
        repo.url,
    )
}

/// Substitute `{name}` placeholders. `{{` and `}}` are literal braces.
fn render_template(template: &str, facts: &PromptFacts) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                let mut closed = false;
                for (_, nc) in chars.by_ref() {
                    if nc == '}' {
                        closed = true;
                        break;
                    }
                    if nc == '{' {
                        return Err(PromptError::Malformed {
                            position: pos,
                            reason: "nested '{' in placeholder",
                        });
                    }
                    name.push(nc);
                }
                if !closed {
                    return Err(PromptError::Malformed {
                        position: pos,
                        reason: "unterminated placeholder",
                    });
                }
                let value = facts
                    .placeholder(name.trim())
                    .ok_or_else(|| PromptError::UnknownPlaceholder(name.clone()))?;
                out.push_str(&value);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(PromptError::Malformed {
                        position: pos,
                        reason: "single '}' outside a placeholder",
                    });
                }
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}
