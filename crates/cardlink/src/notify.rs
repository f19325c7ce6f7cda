//! Field extraction for unsolicited result lines.
//!
//! Parsers take the full line, prefix included, and return `None` when the
//! fields are not in the expected shape. Message and feature-code bodies are
//! passed through undecoded.

use cardlink_core::types::RegistrationStatus;

/// The text after the first `:`, trimmed.
pub fn payload(line: &str) -> &str {
    line.split_once(':').map_or("", |(_, rest)| rest.trim())
}

fn fields(line: &str) -> impl Iterator<Item = &str> {
    payload(line).split(',').map(str::trim)
}

fn unquote(field: &str) -> Option<&str> {
    field.strip_prefix('"')?.strip_suffix('"')
}

/// `^RSSI: <n>` or `+CSQ: <rssi>,<ber>`.
pub fn signal(line: &str) -> Option<u8> {
    fields(line).next()?.parse().ok()
}

/// `+CREG: <stat>[,<lac>,<ci>]` (unsolicited) or
/// `+CREG: <n>,<stat>[,<lac>,<ci>]` (query response).
pub fn registration(line: &str) -> Option<RegistrationStatus> {
    let parts: Vec<&str> = fields(line).collect();
    let stat = match parts.as_slice() {
        [_, stat, ..] if !stat.starts_with('"') => stat,
        [stat, ..] => stat,
        [] => return None,
    };
    stat.parse().ok().map(RegistrationStatus::from_code)
}

/// `+CLIP: "<number>",<type>,...`. An empty number means withheld.
pub fn caller(line: &str) -> Option<String> {
    let number = unquote(fields(line).next()?)?;
    (!number.is_empty()).then(|| number.to_string())
}

/// `+CNUM: "<alpha>","<number>",<type>`.
pub fn own_number(line: &str) -> Option<String> {
    if line.starts_with("ERROR") {
        return None;
    }
    let number = unquote(fields(line).nth(1)?)?;
    (!number.is_empty()).then(|| number.to_string())
}

/// `+CMTI: "<mem>",<index>`.
pub fn message_index(line: &str) -> Option<u32> {
    fields(line).last()?.parse().ok()
}

/// Split the text collected by `AT+CMGR` into the header fields and the
/// raw body lines.
pub fn stored_message(lines: &[String]) -> Option<(String, String)> {
    let start = lines.iter().position(|l| l.starts_with("+CMGR:"))?;
    let header = payload(&lines[start]).to_string();
    let body = lines[start + 1..].join("\n");
    Some((header, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_levels() {
        assert_eq!(signal("^RSSI: 17"), Some(17));
        assert_eq!(signal("+CSQ: 20,99"), Some(20));
        assert_eq!(signal("+CSQ: x"), None);
    }

    #[test]
    fn registration_forms() {
        assert_eq!(registration("+CREG: 1"), Some(RegistrationStatus::Home));
        assert_eq!(
            registration("+CREG: 5,\"00C3\",\"0A1F\""),
            Some(RegistrationStatus::Roaming)
        );
        assert_eq!(registration("+CREG: 2,1,\"00C3\",\"0A1F\""), Some(RegistrationStatus::Home));
        assert_eq!(registration("+CREG: 2,0"), Some(RegistrationStatus::NotRegistered));
        assert_eq!(registration("+CREG: 2,3"), Some(RegistrationStatus::Denied));
        assert_eq!(registration("+CREG:"), None);
    }

    #[test]
    fn caller_id() {
        assert_eq!(
            caller("+CLIP: \"+15551234\",145,,,,0").as_deref(),
            Some("+15551234")
        );
        assert_eq!(caller("+CLIP: \"\",128,,,,1"), None);
    }

    #[test]
    fn own_number_forms() {
        assert_eq!(
            own_number("+CNUM: \"Me\",\"+15550000\",145").as_deref(),
            Some("+15550000")
        );
        assert_eq!(own_number("ERROR+CNUM: \"\",\"\",129"), None);
        assert_eq!(own_number("+CNUM: \"\",\"\",129"), None);
    }

    #[test]
    fn message_indication() {
        assert_eq!(message_index("+CMTI: \"SM\",3"), Some(3));
        assert_eq!(message_index("+CMTI: \"ME\""), None);
    }

    #[test]
    fn stored_message_split() {
        let lines = vec![
            "+CMGR: \"REC UNREAD\",\"+15551234\",,\"26/10/15,10:00:00+00\"".to_string(),
            "hello".to_string(),
            "world".to_string(),
        ];
        let (header, body) = stored_message(&lines).unwrap();
        assert!(header.starts_with("\"REC UNREAD\""));
        assert_eq!(body, "hello\nworld");
        assert_eq!(stored_message(&["hello".to_string()]), None);
    }

    #[test]
    fn payload_after_colon() {
        assert_eq!(payload("+CUSD: 0,\"Balance 5\",15"), "0,\"Balance 5\",15");
        assert_eq!(payload("RING"), "");
    }
}
