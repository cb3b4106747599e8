use {
  crate::config::{ConfigSource, DISPLAY_VAR, FILTER_VAR},
  std::{
    fmt::{self, Debug, Formatter},
    ops::BitOr,
    sync::OnceLock,
  },
};

/// Set of event categories the recorder prints.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct DisplayFlags(u8);

impl DisplayFlags {
  pub const NONE: Self = Self(0);
  pub const CREATE: Self = Self(1);
  pub const REFS: Self = Self(1 << 2);
  pub const BACKTRACE: Self = Self(1 << 3);
  pub const ALL: Self =
    Self(Self::CREATE.0 | Self::REFS.0 | Self::BACKTRACE.0);
  pub const DEFAULT: Self = Self::CREATE;

  const NAMES: [(&'static str, Self); 5] = [
    ("none", Self::NONE),
    ("create", Self::CREATE),
    ("refs", Self::REFS),
    ("backtrace", Self::BACKTRACE),
    ("all", Self::ALL),
  ];

  /// Parse a comma separated category list.
  ///
  /// An unset or empty value yields [`DisplayFlags::DEFAULT`]. Otherwise the
  /// default is cleared and every recognized token is added; unknown tokens
  /// are ignored.
  #[must_use]
  pub fn parse(value: Option<&str>) -> Self {
    let Some(value) = value.filter(|value| !value.is_empty()) else {
      return Self::DEFAULT;
    };

    value
      .split(',')
      .filter_map(|token| {
        let token = token.trim();
        Self::NAMES
          .iter()
          .find(|(name, _)| name.eq_ignore_ascii_case(token))
          .map(|(_, flag)| *flag)
      })
      .fold(Self::NONE, |flags, flag| flags | flag)
  }

  #[must_use]
  pub const fn contains(self, other: Self) -> bool {
    other.0 != 0 && self.0 & other.0 == other.0
  }

  #[must_use]
  pub const fn union(self, other: Self) -> Self {
    Self(self.0 | other.0)
  }
}

impl BitOr for DisplayFlags {
  type Output = Self;

  fn bitor(self, rhs: Self) -> Self {
    self.union(rhs)
  }
}

impl Debug for DisplayFlags {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let names = [
      ("create", Self::CREATE),
      ("refs", Self::REFS),
      ("backtrace", Self::BACKTRACE),
    ]
    .into_iter()
    .filter(|(_, flag)| self.contains(*flag))
    .map(|(name, _)| name);

    f.debug_set().entries(names).finish()
  }
}

/// Answers whether a display category is enabled.
///
/// The configuration is read once, on first use, from the configured source.
#[derive(Debug)]
pub struct DisplayFilter {
  resolved: OnceLock<DisplayFlags>,
  source: ConfigSource,
}

impl DisplayFilter {
  #[must_use]
  pub fn new(source: ConfigSource) -> Self {
    Self {
      resolved: OnceLock::new(),
      source,
    }
  }

  /// A filter that is already resolved to `flags`.
  #[must_use]
  pub fn fixed(flags: DisplayFlags) -> Self {
    Self {
      resolved: OnceLock::from(flags),
      source: ConfigSource::default(),
    }
  }

  #[must_use]
  pub fn flags(&self) -> DisplayFlags {
    *self.resolved.get_or_init(|| {
      DisplayFlags::parse(self.source.get(DISPLAY_VAR).as_deref())
    })
  }

  #[must_use]
  pub fn enabled(&self, flag: DisplayFlags) -> bool {
    self.flags().contains(flag)
  }
}

/// Answers whether objects of a given type are of interest.
#[derive(Debug)]
pub struct NameFilter {
  prefix: OnceLock<Option<String>>,
  source: ConfigSource,
}

impl NameFilter {
  #[must_use]
  pub fn new(source: ConfigSource) -> Self {
    Self {
      prefix: OnceLock::new(),
      source,
    }
  }

  #[must_use]
  pub fn fixed(prefix: Option<&str>) -> Self {
    Self {
      prefix: OnceLock::from(prefix.map(str::to_owned)),
      source: ConfigSource::default(),
    }
  }

  #[must_use]
  pub fn prefix(&self) -> Option<&str> {
    self
      .prefix
      .get_or_init(|| self.source.get(FILTER_VAR))
      .as_deref()
  }

  #[must_use]
  pub fn matches(&self, type_name: &str) -> bool {
    self
      .prefix()
      .map_or(true, |prefix| type_name.starts_with(prefix))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unset_or_empty_display_defaults_to_create() {
    assert_eq!(DisplayFlags::parse(None), DisplayFlags::CREATE);
    assert_eq!(DisplayFlags::parse(Some("")), DisplayFlags::CREATE);
  }

  #[test]
  fn all_enables_every_category() {
    let flags = DisplayFlags::parse(Some("all"));
    assert!(flags.contains(DisplayFlags::CREATE));
    assert!(flags.contains(DisplayFlags::REFS));
    assert!(flags.contains(DisplayFlags::BACKTRACE));
  }

  #[test]
  fn tokens_combine_case_insensitively_and_ignore_unknowns() {
    let flags = DisplayFlags::parse(Some("Refs, bogus,BACKTRACE"));
    assert!(!flags.contains(DisplayFlags::CREATE));
    assert!(flags.contains(DisplayFlags::REFS));
    assert!(flags.contains(DisplayFlags::BACKTRACE));
  }

  #[test]
  fn none_and_unknown_only_disable_everything() {
    assert_eq!(DisplayFlags::parse(Some("none")), DisplayFlags::NONE);
    assert_eq!(DisplayFlags::parse(Some("verbose")), DisplayFlags::NONE);
    assert!(!DisplayFlags::NONE.contains(DisplayFlags::NONE));
  }

  #[test]
  fn display_filter_resolves_once() {
    let filter =
      DisplayFilter::new(ConfigSource::fixed([(DISPLAY_VAR, "refs")]));
    assert!(filter.enabled(DisplayFlags::REFS));
    assert!(!filter.enabled(DisplayFlags::CREATE));
    assert_eq!(filter.flags(), filter.flags());
  }

  #[test]
  fn name_filter_matches_prefix() {
    let filter = NameFilter::new(ConfigSource::fixed([(FILTER_VAR, "Gst")]));
    assert!(filter.matches("GstBin"));
    assert!(filter.matches("Gst"));
    assert!(!filter.matches("GObject"));
  }

  #[test]
  fn unconfigured_name_filter_matches_everything() {
    let filter = NameFilter::new(ConfigSource::fixed::<_, String, String>([]));
    assert!(filter.matches("Anything"));
    assert!(filter.matches(""));
  }
}
