//! # Input Validation Module
//!
//! This module provides validation functions for user inputs to prevent
//! invalid data from entering the system and improve security.

use std::sync::OnceLock;

use anyhow::{Context, anyhow};
use regex::Regex;

/// Options to validate input strings to have certain properties.
/// This ensures only valid data can enter the system.
///
/// ## Usage
///
/// ```
/// # use validations::{StringValidator, StringValidatorMatches};
/// StringValidator::default()
///   .min_length(1)
///   .max_length(50)
///   .matches(StringValidatorMatches::ServiceName)
///   .validate("web-1")
///   .unwrap();
/// ```
#[derive(Default)]
pub struct StringValidator {
  /// Specify the minimum length of string.
  /// Setting `0` will effectively skip this validation.
  pub min_length: usize,
  /// Specify max length of string, or None to allow arbitrary length.
  pub max_length: Option<usize>,
  /// Skip the control character check.
  /// Most values should not contain these by default.
  pub skip_control_check: bool,
  /// Specify a pattern to validate the string contents.
  pub matches: Option<StringValidatorMatches>,
}

impl StringValidator {
  /// Returns Ok if input passes validations, otherwise includes
  /// error with failure reason.
  pub fn validate(&self, input: &str) -> anyhow::Result<()> {
    let len = input.len();

    if len < self.min_length {
      return Err(anyhow!(
        "Input too short. Must be at least {} characters.",
        self.min_length
      ));
    }

    if let Some(max_length) = self.max_length
      && len > max_length
    {
      return Err(anyhow!(
        "Input too long. Must be at most {max_length} characters."
      ));
    }

    if !self.skip_control_check {
      validate_no_control_chars(input)?;
    }

    if let Some(matches) = &self.matches {
      matches.validate(input)?
    }

    Ok(())
  }

  pub fn min_length(mut self, min_length: usize) -> StringValidator {
    self.min_length = min_length;
    self
  }

  pub fn max_length(
    mut self,
    max_length: impl Into<Option<usize>>,
  ) -> StringValidator {
    self.max_length = max_length.into();
    self
  }

  pub fn skip_control_check(mut self) -> StringValidator {
    self.skip_control_check = true;
    self
  }

  pub fn matches(
    mut self,
    matches: impl Into<Option<StringValidatorMatches>>,
  ) -> StringValidator {
    self.matches = matches.into();
    self
  }
}

pub enum StringValidatorMatches {
  /// `[A-Za-z0-9_-]+`, used for project and service names.
  ServiceName,
  /// A single path segment: alphanumeric, underscores, hyphens, dots,
  /// but never `..`, `/`, or `\`. Used for config filenames.
  PathSegment,
  /// A docker network name: alphanumeric, underscores, hyphens, dots.
  NetworkName,
}

impl StringValidatorMatches {
  /// Returns Ok if input passes validations, otherwise includes
  /// error with failure reason.
  fn validate(&self, input: &str) -> anyhow::Result<()> {
    let validate = || match self {
      StringValidatorMatches::ServiceName => {
        static REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = REGEX.get_or_init(|| {
          Regex::new(r"^[A-Za-z0-9_-]+$")
            .expect("Failed to initialize service name regex")
        });
        if regex.is_match(input) {
          Ok(())
        } else {
          Err(anyhow!(
            "Only alphanumeric characters, underscores, and hyphens are allowed"
          ))
        }
      }

      StringValidatorMatches::PathSegment => {
        if input == ".."
          || input.contains('/')
          || input.contains('\\')
        {
          return Err(anyhow!(
            "Must be a single path segment: no '..', '/', or '\\'"
          ));
        }
        static REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = REGEX.get_or_init(|| {
          Regex::new(r"^[A-Za-z0-9_.-]+$")
            .expect("Failed to initialize path segment regex")
        });
        if regex.is_match(input) {
          Ok(())
        } else {
          Err(anyhow!(
            "Only alphanumeric characters, underscores, hyphens, and dots are allowed"
          ))
        }
      }

      StringValidatorMatches::NetworkName => {
        static REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = REGEX.get_or_init(|| {
          Regex::new(r"^[A-Za-z0-9_.-]+$")
            .expect("Failed to initialize network name regex")
        });
        if regex.is_match(input) {
          Ok(())
        } else {
          Err(anyhow!(
            "Only alphanumeric characters, underscores, hyphens, and dots are allowed"
          ))
        }
      }
    };
    validate().context("Invalid characters in input")
  }
}

fn validate_no_control_chars(input: &str) -> anyhow::Result<()> {
  for (index, char) in input.chars().enumerate() {
    if char.is_control() {
      return Err(anyhow!(
        "Control character at index {index}. Input: \"{input}\""
      ));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn service_name_rejects_slashes() {
    let v = StringValidator::default()
      .min_length(1)
      .max_length(50)
      .matches(StringValidatorMatches::ServiceName);
    assert!(v.validate("web-1").is_ok());
    assert!(v.validate("../etc").is_err());
    assert!(v.validate("").is_err());
  }

  #[test]
  fn path_segment_rejects_traversal() {
    let v = StringValidator::default()
      .min_length(1)
      .matches(StringValidatorMatches::PathSegment);
    assert!(v.validate("app.env").is_ok());
    assert!(v.validate("..").is_err());
    assert!(v.validate("a/b").is_err());
    assert!(v.validate("a\\b").is_err());
  }
}
