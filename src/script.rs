use speedgb_core::Buttons;

/// Buttons held over a half-open frame range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hold {
    pub buttons: Buttons,
    pub start: u64,
    pub end: u64,
}

/// Scripted input for headless runs.
///
/// Entries are `BUTTONS@START..END`, separated by commas or whitespace,
/// where `BUTTONS` joins button names with `+`: `start@60..62 a+right@100..200`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputScript {
    holds: Vec<Hold>,
}

impl InputScript {
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut holds = Vec::new();
        for entry in text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|e| !e.is_empty())
        {
            let (names, range) = entry
                .split_once('@')
                .ok_or_else(|| format!("missing '@' in {entry:?}"))?;
            let (start, end) = range
                .split_once("..")
                .ok_or_else(|| format!("missing '..' in {entry:?}"))?;
            let start: u64 = start
                .parse()
                .map_err(|e| format!("bad start frame in {entry:?}: {e}"))?;
            let end: u64 = end
                .parse()
                .map_err(|e| format!("bad end frame in {entry:?}: {e}"))?;
            if end < start {
                return Err(format!("range ends before it starts in {entry:?}"));
            }

            let mut buttons = Buttons::empty();
            for name in names.split('+') {
                buttons |= Buttons::parse_name(name)
                    .ok_or_else(|| format!("unknown button {name:?}"))?;
            }
            holds.push(Hold {
                buttons,
                start,
                end,
            });
        }
        Ok(Self { holds })
    }

    pub fn buttons_at(&self, frame: u64) -> Buttons {
        self.holds
            .iter()
            .filter(|h| (h.start..h.end).contains(&frame))
            .fold(Buttons::empty(), |acc, h| acc | h.buttons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_holds_combine() {
        let script = InputScript::parse("start@60..62, a+right@61..200").unwrap();
        assert_eq!(script.buttons_at(59), Buttons::empty());
        assert_eq!(script.buttons_at(60), Buttons::START);
        assert_eq!(
            script.buttons_at(61),
            Buttons::START | Buttons::A | Buttons::RIGHT
        );
        assert_eq!(script.buttons_at(62), Buttons::A | Buttons::RIGHT);
        assert_eq!(script.buttons_at(200), Buttons::empty());
    }

    #[test]
    fn malformed_entries_are_reported() {
        assert!(InputScript::parse("start").unwrap_err().contains("'@'"));
        assert!(InputScript::parse("start@5").unwrap_err().contains("'..'"));
        assert!(InputScript::parse("turbo@1..2").unwrap_err().contains("turbo"));
        assert!(InputScript::parse("a@9..3").is_err());
        assert_eq!(InputScript::parse("  ").unwrap(), InputScript::default());
    }
}
