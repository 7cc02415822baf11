use rollcall_core::Mark;
use std::io::{BufRead, Write};
use std::sync::Mutex;

/// Operator's reply to "scan for a face now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Quit,
}

/// The human side of a session. Both calls may block indefinitely; the scan
/// loop always invokes them from their own background thread.
pub trait Operator: Send + Sync + 'static {
    fn ask_scan(&self) -> Answer;

    /// Show `identity`'s members and return one mark per member, in order.
    fn take_attendance(&self, identity: &str, members: &[String]) -> std::io::Result<Vec<Mark>>;
}

/// Line-oriented prompt on a terminal (or any reader/writer pair).
pub struct TerminalOperator {
    input: Mutex<Box<dyn BufRead + Send>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl TerminalOperator {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    pub fn stdio() -> Self {
        Self::new(
            Box::new(std::io::BufReader::new(std::io::stdin())),
            Box::new(std::io::stdout()),
        )
    }

    fn say(&self, text: &str) -> std::io::Result<()> {
        let mut out = self
            .output
            .lock()
            .map_err(|_| std::io::Error::other("operator output lock poisoned"))?;
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    /// Read one line; `None` on end of input.
    fn read_line(&self) -> std::io::Result<Option<String>> {
        let mut input = self
            .input
            .lock()
            .map_err(|_| std::io::Error::other("operator input lock poisoned"))?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

impl Operator for TerminalOperator {
    fn ask_scan(&self) -> Answer {
        loop {
            if let Err(err) = self.say("Do you want to detect a face now? [y/n/q] ") {
                tracing::warn!(error = %err, "operator prompt failed; quitting");
                return Answer::Quit;
            }
            let line = match self.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!("operator input closed; quitting");
                    return Answer::Quit;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "operator input failed; quitting");
                    return Answer::Quit;
                }
            };
            match line.to_ascii_lowercase().as_str() {
                "y" | "yes" => return Answer::Yes,
                "n" | "no" => return Answer::No,
                "q" | "quit" => return Answer::Quit,
                _ => continue,
            }
        }
    }

    fn take_attendance(&self, identity: &str, members: &[String]) -> std::io::Result<Vec<Mark>> {
        let mut sheet = format!("\n{identity}'s team attendance\n");
        for (i, member) in members.iter().enumerate() {
            sheet.push_str(&format!("  {}. {member}\n", i + 1));
        }
        self.say(&sheet)?;

        loop {
            self.say("Present members (e.g. 1,3 / all / blank for none): ")?;
            let Some(line) = self.read_line()? else {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "operator input closed during attendance",
                ));
            };
            match parse_selection(&line, members.len()) {
                Ok(present) => {
                    return Ok(members
                        .iter()
                        .zip(present)
                        .map(|(member, present)| Mark::new(member.clone(), present))
                        .collect());
                }
                Err(reason) => self.say(&format!("{reason}\n"))?,
            }
        }
    }
}

/// Parse a 1-based selection such as `1,3`, `2 4` or `all` into one flag per member.
pub fn parse_selection(input: &str, count: usize) -> Result<Vec<bool>, String> {
    let mut present = vec![false; count];
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") {
        return Ok(vec![true; count]);
    }
    for token in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let n: usize = token
            .parse()
            .map_err(|_| format!("not a member number: {token:?}"))?;
        if n == 0 || n > count {
            return Err(format!("member number {n} out of range 1..={count}"));
        }
        present[n - 1] = true;
    }
    Ok(present)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn operator(input: &str) -> TerminalOperator {
        TerminalOperator::new(
            Box::new(Cursor::new(input.as_bytes().to_vec())),
            Box::new(std::io::sink()),
        )
    }

    fn members() -> Vec<String> {
        vec!["Bob".into(), "Carol".into(), "Erin".into()]
    }

    #[test]
    fn test_ask_scan_answers() {
        assert_eq!(operator("y\n").ask_scan(), Answer::Yes);
        assert_eq!(operator("No\n").ask_scan(), Answer::No);
        assert_eq!(operator("q\n").ask_scan(), Answer::Quit);
    }

    #[test]
    fn test_ask_scan_reprompts_on_garbage() {
        assert_eq!(operator("maybe\n\nyes\n").ask_scan(), Answer::Yes);
    }

    #[test]
    fn test_ask_scan_eof_quits() {
        assert_eq!(operator("").ask_scan(), Answer::Quit);
    }

    #[test]
    fn test_take_attendance_marks_every_member() {
        let marks = operator("1,3\n").take_attendance("Alice", &members()).unwrap();
        assert_eq!(
            marks,
            vec![
                Mark::new("Bob", true),
                Mark::new("Carol", false),
                Mark::new("Erin", true),
            ]
        );
    }

    #[test]
    fn test_take_attendance_blank_marks_all_absent() {
        let marks = operator("\n").take_attendance("Alice", &members()).unwrap();
        assert!(marks.iter().all(|m| !m.present));
        assert_eq!(marks.len(), 3);
    }

    #[test]
    fn test_take_attendance_retries_invalid_selection() {
        let marks = operator("7\n2\n").take_attendance("Alice", &members()).unwrap();
        assert_eq!(marks[1], Mark::new("Carol", true));
        assert!(!marks[0].present && !marks[2].present);
    }

    #[test]
    fn test_take_attendance_eof_is_error() {
        let err = operator("").take_attendance("Alice", &members()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("all", 2), Ok(vec![true, true]));
        assert_eq!(parse_selection(" 2  1 ", 3), Ok(vec![true, true, false]));
        assert_eq!(parse_selection("", 2), Ok(vec![false, false]));
        assert!(parse_selection("0", 2).is_err());
        assert!(parse_selection("x", 2).is_err());
    }
}
