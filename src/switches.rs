//! Named on/off toggles, e.g. for picking which controllers a manager runs.
//!
//! A switches value is written as comma separated items: `name` enables an
//! item, `-name` disables it and `*` restores the defaults. Items are applied
//! left to right, so `*,-foo` means "defaults, but without foo".
use clap::{builder::TypedValueParser, error::ErrorKind};
use std::{
    collections::{BTreeMap, BTreeSet},
    ffi::OsStr,
    fmt::{self, Display, Formatter},
};

/// Restores the defaults
pub const ALL: &str = "*";

const DISABLE_PREFIX: char = '-';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unknown item: {0}")]
    UnknownItem(String),
    #[error("malformed switches {spec:?}: {reason}")]
    Malformed { spec: String, reason: &'static str },
}

/// Marks `name` as disabled, for use in [`Switches::new`].
pub fn disable(name: &str) -> String {
    format!("{}{}", DISABLE_PREFIX, name)
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Switches {
    defaults: BTreeMap<String, bool>,
    settings: BTreeMap<String, bool>,
}

fn parse_item(item: &str) -> (&str, bool) {
    match item.strip_prefix(DISABLE_PREFIX) {
        Some(name) => (name, false),
        None => (item, true),
    }
}

/// Splits on commas, honoring double quotes the way CSV does.
fn split_items(spec: &str) -> Result<Vec<String>, &'static str> {
    let mut items = Vec::new();
    let mut chars = spec.chars().peekable();
    loop {
        let mut item = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        item.push('"');
                    }
                    Some('"') => break,
                    Some(c) => item.push(c),
                    None => return Err("unterminated quote"),
                }
            }
            match chars.next() {
                None => {
                    items.push(item);
                    return Ok(items);
                }
                Some(',') => items.push(item),
                Some(_) => return Err("unexpected character after quoted item"),
            }
        } else {
            loop {
                match chars.next() {
                    None => {
                        items.push(item);
                        return Ok(items);
                    }
                    Some(',') => break,
                    Some('"') => return Err("bare quote in unquoted item"),
                    Some('\n') | Some('\r') => return Err("line break outside quotes"),
                    Some(c) => item.push(c),
                }
            }
            items.push(item);
        }
    }
}

impl Switches {
    /// Creates switches over `items`; items prefixed with `-` are disabled by default.
    ///
    /// Nothing is enabled until [`Switches::set`] is called, typically with `*`.
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let defaults = items
            .into_iter()
            .map(|item| {
                let (name, enabled) = parse_item(item.as_ref());
                (name.to_string(), enabled)
            })
            .collect();
        Switches {
            defaults,
            settings: BTreeMap::new(),
        }
    }

    /// Applies `spec`. Either all items are applied or, on error, none.
    /// An empty spec leaves the settings untouched.
    pub fn set(&mut self, spec: &str) -> Result<(), Error> {
        if spec.is_empty() {
            return Ok(());
        }
        let items = split_items(spec).map_err(|reason| Error::Malformed {
            spec: spec.to_string(),
            reason,
        })?;

        for item in &items {
            let (name, _) = parse_item(item);
            if name == ALL {
                if item != ALL {
                    return Err(Error::Malformed {
                        spec: spec.to_string(),
                        reason: "the defaults cannot be disabled",
                    });
                }
                continue;
            }
            if !self.defaults.contains_key(name) {
                return Err(Error::UnknownItem(name.to_string()));
            }
        }

        let mut settings = BTreeMap::new();
        if items.iter().any(|item| item == ALL) {
            settings = self.defaults.clone();
        }
        for item in items.iter().filter(|item| *item != ALL) {
            let (name, enabled) = parse_item(item);
            settings.insert(name.to_string(), enabled);
        }
        self.settings = settings;
        Ok(())
    }

    pub fn enabled(&self, name: &str) -> bool {
        self.settings.get(name).copied().unwrap_or(false)
    }

    /// Names of all known items
    pub fn all(&self) -> BTreeSet<String> {
        self.defaults.keys().cloned().collect()
    }

    /// Names of all enabled items
    pub fn active(&self) -> BTreeSet<String> {
        names_with(&self.settings, true)
    }

    pub fn enabled_by_default(&self) -> BTreeSet<String> {
        names_with(&self.defaults, true)
    }

    pub fn disabled_by_default(&self) -> BTreeSet<String> {
        names_with(&self.defaults, false)
    }
}

fn names_with(map: &BTreeMap<String, bool>, enabled: bool) -> BTreeSet<String> {
    map.iter()
        .filter(|(_, v)| **v == enabled)
        .map(|(k, _)| k.clone())
        .collect()
}

/// Canonical form: every known item, sorted by name.
impl Display for Switches {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let items = self
            .defaults
            .keys()
            .map(|name| {
                if self.enabled(name) {
                    name.clone()
                } else {
                    disable(name)
                }
            })
            .collect::<Vec<_>>();
        f.write_str(&items.join(","))
    }
}

/// Parses command line values into [`Switches`] over a fixed set of items.
#[derive(Debug, Clone)]
pub struct SwitchesParser {
    template: Switches,
}

impl SwitchesParser {
    pub fn new(template: Switches) -> Self {
        SwitchesParser { template }
    }
}

impl TypedValueParser for SwitchesParser {
    type Value = Switches;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        arg: Option<&clap::Arg>,
        value: &OsStr,
    ) -> Result<Switches, clap::Error> {
        let value = value
            .to_str()
            .ok_or_else(|| clap::Error::new(ErrorKind::InvalidUtf8).with_cmd(cmd))?;
        let mut switches = self.template.clone();
        switches.set(value).map_err(|err| {
            let arg = arg.map(ToString::to_string).unwrap_or_else(|| "...".to_string());
            clap::Error::raw(
                ErrorKind::ValueValidation,
                format!("invalid value {:?} for '{}': {}\n", value, arg, err),
            )
            .with_cmd(cmd)
        })?;
        Ok(switches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn abc() -> Switches {
        Switches::new(["a", "-b", "c"])
    }

    #[test]
    fn defaults_are_split_by_prefix() {
        let s = abc();
        assert_eq!(s.all(), names(&["a", "b", "c"]));
        assert_eq!(s.enabled_by_default(), names(&["a", "c"]));
        assert_eq!(s.disabled_by_default(), names(&["b"]));
        assert!(s.active().is_empty());
    }

    #[test]
    fn later_items_override() {
        let mut s = abc();
        s.set("*,-a").unwrap();
        assert!(!s.enabled("a"));
        assert!(!s.enabled("b"));
        assert!(s.enabled("c"));

        s.set("a,b,-a").unwrap();
        assert!(!s.enabled("a"));
        assert!(s.enabled("b"));
        assert!(!s.enabled("c"));

        // the position of * does not matter
        s.set("-c,*").unwrap();
        assert_eq!(s.active(), names(&["a"]));
    }

    #[test]
    fn canonical_form_round_trips() {
        for spec in ["*", "*,-a", "b", "-a,-b,-c", "\"a\",c"] {
            let mut s = abc();
            s.set(spec).unwrap();
            let canonical = s.to_string();

            let mut reparsed = abc();
            reparsed.set(&canonical).unwrap();
            assert_eq!(reparsed.active(), s.active(), "{}", spec);
            assert_eq!(reparsed.to_string(), canonical);
        }

        let mut s = abc();
        s.set("*").unwrap();
        assert_eq!(s.to_string(), "a,-b,c");
    }

    #[test]
    fn unknown_items_change_nothing() {
        let mut s = abc();
        s.set("a").unwrap();
        assert_eq!(s.set("b,d"), Err(Error::UnknownItem("d".into())));
        assert_eq!(s.set("-e"), Err(Error::UnknownItem("e".into())));
        assert_eq!(s.active(), names(&["a"]));
    }

    #[test]
    fn empty_spec_keeps_settings() {
        let mut s = abc();
        s.set("*").unwrap();
        s.set("").unwrap();
        assert_eq!(s.active(), names(&["a", "c"]));
    }

    #[test]
    fn quoted_items() {
        let mut s = Switches::new(["with,comma", "plain"]);
        s.set("\"with,comma\"").unwrap();
        assert!(s.enabled("with,comma"));
        assert!(!s.enabled("plain"));

        assert!(matches!(s.set("\"unterminated"), Err(Error::Malformed { .. })));
        assert!(matches!(s.set("pl\"ain"), Err(Error::Malformed { .. })));
        assert!(matches!(s.set("-*"), Err(Error::Malformed { .. })));
    }

    #[test]
    fn csv_edge_cases() {
        assert_eq!(split_items("a,"), Ok(vec!["a".to_string(), String::new()]));
        assert_eq!(split_items("\"\""), Ok(vec![String::new()]));
        assert_eq!(
            split_items("\"say \"\"hi\"\"\",b"),
            Ok(vec!["say \"hi\"".to_string(), "b".to_string()])
        );
        assert!(split_items("\"a\"b").is_err());
        assert!(split_items(" \"a\"").is_err());

        let mut s = abc();
        s.set("a").unwrap();
        // empty items name no switch
        assert_eq!(s.set("a,"), Err(Error::UnknownItem(String::new())));
        assert_eq!(s.set("\"\""), Err(Error::UnknownItem(String::new())));
        assert_eq!(s.set(",c"), Err(Error::UnknownItem(String::new())));
        assert_eq!(s.active(), names(&["a"]));

        let mut quoted = Switches::new(["say \"hi\""]);
        quoted.set("\"say \"\"hi\"\"\"").unwrap();
        assert!(quoted.enabled("say \"hi\""));
    }

    #[test]
    fn command_line_parsing() {
        let cmd = || {
            clap::Command::new("manager").arg(
                clap::Arg::new("controllers")
                    .long("controllers")
                    .value_parser(SwitchesParser::new(abc()))
                    .default_value(ALL),
            )
        };

        let matches = cmd().try_get_matches_from(["manager"]).unwrap();
        let s = matches.get_one::<Switches>("controllers").unwrap();
        assert_eq!(s.to_string(), "a,-b,c");

        let matches = cmd()
            .try_get_matches_from(["manager", "--controllers", "b"])
            .unwrap();
        let s = matches.get_one::<Switches>("controllers").unwrap();
        assert_eq!(s.active(), names(&["b"]));

        let err = cmd()
            .try_get_matches_from(["manager", "--controllers", "x"])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }
}
