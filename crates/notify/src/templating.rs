//! Minijinja rendering for notice messages.
//!
//! Both message templates are compiled once into a shared
//! [`minijinja::Environment`]. Undefined variables are a hard error, and a
//! template that references anything outside [`PLACEHOLDERS`] is rejected
//! when the renderer is built rather than on first send.

use std::fmt;

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use rentwatch_core::config::NoticeConfig;
use rentwatch_core::format_minor_units;

/// Every name a notice template may reference.
pub const PLACEHOLDERS: [&str; 5] = ["mention", "amount_owed", "bsb", "account", "contact"];

pub const NOTICE_TEMPLATE: &str = "\
# Rent Notice {{ mention }}

Amount owing: ${{ amount_owed }}

BSB: {{ bsb }}
Account: {{ account }}

Please contact {{ contact }} within 24 hours if there are any issues!
";

pub const REMINDER_TEMPLATE: &str = "\
# Rent Reminder {{ mention }}

This is an automated rent reminder. You still owe: ${{ amount_owed }}

Please contact {{ contact }} within 24 hours if there are any issues!
";

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template {template} failed: {source}")]
    Syntax {
        template: TemplateKind,
        #[source]
        source: minijinja::Error,
    },

    #[error("template {template} references unknown placeholder(s): {names}")]
    UnknownPlaceholder { template: TemplateKind, names: String },
}

/// Which message is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Sent right after an accrual check posts a charge.
    Notice,
    /// Sent by the periodic sweep.
    Reminder,
}

impl TemplateKind {
    fn name(self) -> &'static str {
        match self {
            TemplateKind::Notice => "notice.txt",
            TemplateKind::Reminder => "reminder.txt",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values substituted into a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoticeParams {
    pub mention: String,
    pub amount_owed: String,
    pub bsb: String,
    pub account: String,
    pub contact: String,
}

impl NoticeParams {
    /// Parameters for a payer owing `owed` minor units.
    pub fn new(payer_id: &str, owed: i64, notice: &NoticeConfig) -> Self {
        Self {
            mention: mention(payer_id),
            amount_owed: format_minor_units(owed),
            bsb: notice.bsb.clone(),
            account: notice.account.clone(),
            contact: mention(&notice.contact_user_id),
        }
    }
}

/// Chat mention markup for a messaging identity.
pub fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

/// Renders the notice and reminder templates.
#[derive(Debug)]
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    /// Renderer with the built-in message texts.
    pub fn new() -> Result<Self, TemplateError> {
        Self::with_sources(NOTICE_TEMPLATE, REMINDER_TEMPLATE)
    }

    /// Renderer with custom texts, checked against [`PLACEHOLDERS`].
    pub fn with_sources(notice: &'static str, reminder: &'static str) -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        for (kind, source) in [(TemplateKind::Notice, notice), (TemplateKind::Reminder, reminder)] {
            env.add_template(kind.name(), source)
                .map_err(|source| TemplateError::Syntax { template: kind, source })?;
            let template = env
                .get_template(kind.name())
                .map_err(|source| TemplateError::Syntax { template: kind, source })?;

            let mut unknown: Vec<String> = template
                .undeclared_variables(false)
                .into_iter()
                .filter(|name| !PLACEHOLDERS.contains(&name.as_str()))
                .collect();
            if !unknown.is_empty() {
                unknown.sort();
                return Err(TemplateError::UnknownPlaceholder {
                    template: kind,
                    names: unknown.join(", "),
                });
            }
        }

        Ok(Self { env })
    }

    pub fn render(&self, kind: TemplateKind, params: &NoticeParams) -> Result<String, TemplateError> {
        self.env
            .get_template(kind.name())
            .and_then(|t| t.render(params))
            .map_err(|source| TemplateError::Syntax { template: kind, source })
    }
}
