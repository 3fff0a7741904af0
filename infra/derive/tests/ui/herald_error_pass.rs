use herald_derive::herald_error;
use std::borrow::Cow;

#[herald_error]
pub enum ConfigError {
    #[error("Read failed{}: {source}", format_context(.context))]
    Io {
        #[source]
        source: std::io::Error,
        context: Option<Cow<'static, str>>,
    },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn read(path: &str) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).context("Reading config")
}

fn fail() -> Result<(), ConfigError> {
    Err("no config".into())
}

fn main() {
    let err = read("/definitely/not/here").unwrap_err();
    assert!(err.to_string().contains("(Reading config)"));

    let err = fail().context("startup").unwrap_err();
    assert_eq!(err.to_string(), "Internal error (startup): no config");
}
