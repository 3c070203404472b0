//! Tagged IRC-style line codec (spec §4.C).
//!
//! Parsing follows the original `twitch_gateway/irc.py::parse_irc_line`
//! reference implementation exactly (tag splitting, prefix stripping,
//! trailing split on `" :"`, head tokenization).

use std::collections::HashMap;

/// A parsed line. `PING` is handled by the connection layer before a
/// `WireMessage` ever reaches a caller — it never surfaces here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub raw: String,
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl WireMessage {
    /// The nick portion of `prefix` (everything before `!`), if present —
    /// used by the Reader to populate `ChatMessage::user`.
    pub fn prefix_nick(&self) -> Option<&str> {
        self.prefix.as_deref().and_then(|p| p.split('!').next())
    }

    /// `id` tag, used to correlate a reply via `reply_parent_msg_id`.
    pub fn msg_id(&self) -> Option<&str> {
        self.tags.get("id").map(String::as_str)
    }
}

/// Parse one line of the wire dialect. `line` must already have its
/// trailing `\r\n` stripped.
pub fn parse_line(line: &str) -> WireMessage {
    let raw = line.to_string();
    let mut rest = line;

    let mut tags = HashMap::new();
    if let Some(stripped) = rest.strip_prefix('@') {
        let (tag_str, remainder) = split_first_space(stripped);
        rest = remainder;
        for item in tag_str.split(';') {
            if item.is_empty() {
                continue;
            }
            match item.split_once('=') {
                Some((k, v)) => {
                    tags.insert(k.to_string(), v.to_string());
                }
                None => {
                    tags.insert(item.to_string(), String::new());
                }
            }
        }
    }

    let mut prefix = None;
    if let Some(stripped) = rest.strip_prefix(':') {
        let (prefix_str, remainder) = split_first_space(stripped);
        prefix = Some(prefix_str.to_string());
        rest = remainder;
    }

    let (head, trailing) = match rest.find(" :") {
        Some(idx) => (&rest[..idx], Some(rest[idx + 2..].to_string())),
        None => (rest, None),
    };

    let mut tokens = head.split(' ').filter(|t| !t.is_empty());
    let command = tokens.next().unwrap_or("").to_string();
    let params: Vec<String> = tokens.map(str::to_string).collect();

    WireMessage {
        raw,
        tags,
        prefix,
        command,
        params,
        trailing,
    }
}

fn split_first_space(s: &str) -> (&str, &str) {
    match s.find(' ') {
        Some(idx) => (&s[..idx], s[idx + 1..].trim_start_matches(' ')),
        None => (s, ""),
    }
}

/// `PASS <cred>`
pub fn format_pass(credential: &str) -> String {
    format!("PASS {credential}")
}

/// `NICK <nick>`
pub fn format_nick(nick: &str) -> String {
    format!("NICK {nick}")
}

/// `CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership`
pub fn format_cap_req() -> String {
    "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership".to_string()
}

/// `JOIN #<channel>`
pub fn format_join(channel: &str) -> String {
    format!("JOIN #{channel}")
}

/// `PRIVMSG #<channel> :<text>`, with `@reply-parent-msg-id=<id> ` prepended
/// when replying to a parent message.
pub fn format_privmsg(channel: &str, text: &str, reply_parent_msg_id: Option<&str>) -> String {
    match reply_parent_msg_id {
        Some(id) => format!("@reply-parent-msg-id={id} PRIVMSG #{channel} :{text}"),
        None => format!("PRIVMSG #{channel} :{text}"),
    }
}

/// `PONG :<payload>`
pub fn format_pong(payload: &str) -> String {
    format!("PONG :{payload}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_privmsg_with_tags_and_prefix() {
        let line = "@badge-info=;badges=subscriber/1;id=abc-123;mod=0 :alice!alice@alice.tmi.twitch.tv PRIVMSG #demo :hello chat";
        let msg = parse_line(line);
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#demo".to_string()]);
        assert_eq!(msg.trailing.as_deref(), Some("hello chat"));
        assert_eq!(msg.prefix.as_deref(), Some("alice!alice@alice.tmi.twitch.tv"));
        assert_eq!(msg.prefix_nick(), Some("alice"));
        assert_eq!(msg.tags.get("id").map(String::as_str), Some("abc-123"));
        assert_eq!(msg.tags.get("mod").map(String::as_str), Some("0"));
        assert_eq!(msg.tags.get("badge-info").map(String::as_str), Some(""));
        assert_eq!(msg.msg_id(), Some("abc-123"));
    }

    #[test]
    fn parses_line_with_no_tags_or_prefix() {
        let msg = parse_line("PING :tmi.twitch.tv");
        assert_eq!(msg.command, "PING");
        assert!(msg.tags.is_empty());
        assert!(msg.prefix.is_none());
        assert_eq!(msg.trailing.as_deref(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn parses_line_with_multiple_params_and_no_trailing() {
        let msg = parse_line(":tmi.twitch.tv CAP * ACK");
        assert_eq!(msg.command, "CAP");
        assert_eq!(msg.params, vec!["*".to_string(), "ACK".to_string()]);
        assert!(msg.trailing.is_none());
    }

    #[test]
    fn round_trips_privmsg_command_params_and_trailing() {
        let emitted = format_privmsg("demo", "hello there", None);
        let line = format!(":bot!bot@bot.tmi.twitch.tv {emitted}");
        let parsed = parse_line(&line);
        assert_eq!(parsed.command, "PRIVMSG");
        assert_eq!(parsed.params, vec!["#demo".to_string()]);
        assert_eq!(parsed.trailing.as_deref(), Some("hello there"));
    }

    #[test]
    fn format_privmsg_with_reply_prepends_tag() {
        let line = format_privmsg("demo", "hi", Some("m1"));
        assert_eq!(line, "@reply-parent-msg-id=m1 PRIVMSG #demo :hi");
    }

    #[test]
    fn format_cap_req_matches_wire_contract() {
        assert_eq!(
            format_cap_req(),
            "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership"
        );
    }

    #[test]
    fn format_join_prefixes_hash() {
        assert_eq!(format_join("demo"), "JOIN #demo");
    }
}
