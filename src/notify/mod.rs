pub mod dispatcher;
pub mod mailer;

pub use dispatcher::{run_scheduler, Notifier, SweepSummary};
pub use mailer::{ConsoleMailer, Email, EmailAttachment, EmailBody, MailError, Mailer, SmtpMailer};
