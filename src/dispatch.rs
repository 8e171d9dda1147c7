//! Action/entity dispatcher: tokenizes one line of input into
//! `(action, entity, args)`, looks the action up by name (or
//! abbreviation), then routes to the handler registered for that
//! action/entity pair.
//!
//! Rather than populating a table via load-time constructors,
//! [`crate::actions::register_all`] builds the same table explicitly,
//! once, in `main`.

use crate::error::Result;
use crate::session::Session;
use crate::tracee::TraceeState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    Function,
    Functions,
    Variable,
    Address,
    Line,
    FileLine,
    Register,
    Breakpoint,
    Watchpoint,
    None_,
}

impl Entity {
    fn parse(word: &str) -> Option<Entity> {
        match word {
            "func" => Some(Entity::Function),
            "funcs" => Some(Entity::Functions),
            "var" => Some(Entity::Variable),
            "addr" => Some(Entity::Address),
            "line" => Some(Entity::Line),
            "fline" => Some(Entity::FileLine),
            "reg" => Some(Entity::Register),
            "break" => Some(Entity::Breakpoint),
            "watch" => Some(Entity::Watchpoint),
            _ => None,
        }
    }
}

pub type Handler = fn(&mut Session, Option<&str>) -> Result<TraceeState>;

#[derive(Clone, Copy)]
pub struct Action {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub handlers: &'static [(Entity, Handler)],
    pub help_text: &'static str,
}

impl Action {
    pub fn matches(&self, word: &str) -> bool {
        self.name == word || self.aliases.contains(&word)
    }

    fn handler_for(&self, entity: Entity) -> Option<Handler> {
        self.handlers
            .iter()
            .find(|(e, _)| *e == entity)
            .map(|(_, h)| *h)
    }

    pub fn print_help(&self) {
        print!("{}", self.help_text);
    }
}

fn print_supported_actions(actions: &[Action]) {
    print!("Supported actions are: ");
    for a in actions {
        print!("{} ", a.name);
    }
    println!();
}

/// Parses a decimal or `0x`-prefixed hex literal.
pub fn parse_addr(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u64>().ok()
    }
}

/// Tokenizes and routes one line of input. `q`/`quit` exit the process
/// immediately; everything else is routed through the registry.
pub fn dispatch(session: &mut Session, line: &str) -> Result<TraceeState> {
    let mut tokens = line.split_whitespace();

    let action_tok = match tokens.next() {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(TraceeState::Stopped),
    };

    if action_tok == "q" || action_tok == "quit" {
        std::process::exit(0);
    }

    let action: Action = match session.actions.iter().find(|a| a.matches(action_tok)).copied() {
        Some(a) => a,
        None => {
            log::error!("invalid action: '{}'", action_tok);
            print_supported_actions(&session.actions);
            return Ok(TraceeState::Stopped);
        }
    };

    // `help <action>` holds the name of another action where the entity
    // token normally goes; handled specially.
    if action.name == "help" {
        let target = tokens.next();
        return match action.handler_for(Entity::None_) {
            Some(h) => h(session, target),
            None => Ok(TraceeState::Stopped),
        };
    }

    let entity_tok = tokens.next();
    let arg = tokens.next();

    let entity = match entity_tok {
        None => Entity::None_,
        Some(t) => match Entity::parse(t) {
            Some(e) => e,
            None => {
                log::error!("invalid entity: '{}'", t);
                action.print_help();
                return Ok(TraceeState::Stopped);
            }
        },
    };

    match action.handler_for(entity) {
        Some(handler) => handler(session, arg),
        None => {
            log::error!("invalid entity({:?}) for action({})", entity, action.name);
            action.print_help();
            Ok(TraceeState::Stopped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_addr_accepts_hex_and_decimal() {
        assert_eq!(parse_addr("0x1000"), Some(0x1000));
        assert_eq!(parse_addr("0X1000"), Some(0x1000));
        assert_eq!(parse_addr("4096"), Some(4096));
        assert_eq!(parse_addr("  0x10  "), Some(0x10));
        assert_eq!(parse_addr("not a number"), None);
    }

    #[test]
    fn entity_parse_recognizes_known_abbreviations() {
        assert_eq!(Entity::parse("func"), Some(Entity::Function));
        assert_eq!(Entity::parse("funcs"), Some(Entity::Functions));
        assert_eq!(Entity::parse("reg"), Some(Entity::Register));
        assert_eq!(Entity::parse("bogus"), None);
    }

    #[test]
    fn action_matches_name_or_alias() {
        let action = Action {
            name: "break",
            aliases: &["br"],
            handlers: &[],
            help_text: "",
        };
        assert!(action.matches("break"));
        assert!(action.matches("br"));
        assert!(!action.matches("watch"));
    }
}
