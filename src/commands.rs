/// `:` commands and their autocomplete ranking

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Dashboard,
  Courses,
  Notifications,
  Certificates,
  Analytics,
  Chat,
  Profile,
  Sync,
  Reconnect,
  Logout,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub action: Action,
}

pub const COMMANDS: &[Command] = &[
  Command {
    name: "dashboard",
    aliases: &["d", "home"],
    description: "Overview and stats",
    action: Action::Dashboard,
  },
  Command {
    name: "courses",
    aliases: &["c", "catalog", "browse"],
    description: "Browse and search courses",
    action: Action::Courses,
  },
  Command {
    name: "notifications",
    aliases: &["n", "inbox"],
    description: "Notifications",
    action: Action::Notifications,
  },
  Command {
    name: "certificates",
    aliases: &["cert", "certs"],
    description: "Earned certificates",
    action: Action::Certificates,
  },
  Command {
    name: "analytics",
    aliases: &["a", "stats"],
    description: "Learning analytics",
    action: Action::Analytics,
  },
  Command {
    name: "chat",
    aliases: &["ai", "assistant"],
    description: "Learning assistant",
    action: Action::Chat,
  },
  Command {
    name: "profile",
    aliases: &["p", "me"],
    description: "Account and sync status",
    action: Action::Profile,
  },
  Command {
    name: "sync",
    aliases: &["refresh"],
    description: "Force a full sync now",
    action: Action::Sync,
  },
  Command {
    name: "reconnect",
    aliases: &["ws"],
    description: "Reconnect the live channel",
    action: Action::Reconnect,
  },
  Command {
    name: "logout",
    aliases: &["signout"],
    description: "Sign out and quit",
    action: Action::Logout,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit lms",
    action: Action::Quit,
  },
];

/// Lower is better; None when the input does not match at all.
fn rank(cmd: &Command, input: &str) -> Option<u32> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Commands matching `input`, best first. Ties keep declaration order.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&'static Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd, &input).map(|r| (cmd, r)))
    .collect();
  matches.sort_by_key(|(_, r)| *r);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Resolve a submitted command name to its action.
pub fn lookup(name: &str) -> Option<Action> {
  let name = name.trim().to_lowercase();
  COMMANDS
    .iter()
    .find(|c| c.name == name || c.aliases.contains(&name.as_str()))
    .map(|c| c.action)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    assert_eq!(get_suggestions("").len(), COMMANDS.len());
  }

  #[test]
  fn test_alias_beats_prefix() {
    // "c" is an alias of courses and a prefix of chat/certificates
    let suggestions = get_suggestions("c");
    assert_eq!(suggestions[0].name, "courses");
    assert!(suggestions.iter().any(|c| c.name == "chat"));
  }

  #[test]
  fn test_prefix_and_substring_match() {
    assert_eq!(get_suggestions("noti")[0].name, "notifications");
    assert_eq!(get_suggestions("ytics")[0].name, "analytics");
    assert!(get_suggestions("zzz").is_empty());
  }

  #[test]
  fn test_lookup_resolves_aliases() {
    assert_eq!(lookup("home"), Some(Action::Dashboard));
    assert_eq!(lookup(" Sync "), Some(Action::Sync));
    assert_eq!(lookup("nope"), None);
  }
}
