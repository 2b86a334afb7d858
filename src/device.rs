//! Prompt state machine for the command-line session.
//!
//! Every line the device prints is classified against one combined
//! [`RegexSet`]: pagination, in-band errors, exec and config prompts, and
//! input prompts (username, password, confirmations) that the session
//! answers automatically.

use std::collections::HashMap;

use log::trace;
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

use crate::error::VerifyError;
use crate::templates::CliTemplate;

/// State name of the exec prompt.
pub const EXEC_STATE: &str = "exec";
/// State name of the configuration prompt.
pub const CONFIG_STATE: &str = "config";
/// State name of the username input prompt.
pub const USERNAME_STATE: &str = "username";
/// State name of the password input prompt.
pub const PASSWORD_STATE: &str = "password";
/// State name of the pagination prompt.
pub const MORE_STATE: &str = "more";
/// State name of the yes/no confirmation prompt.
pub const CONFIRM_STATE: &str = "confirm";

/// Predefined states that exist in every matcher, at indexes 0, 1 and 2.
static PRE_STATE: Lazy<Vec<String>> = Lazy::new(|| {
    vec![
        "Output".to_string(),
        "More".to_string(),
        "Error".to_string(),
    ]
});

/// How an input state is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    /// Whether `value` names a key in the matcher's `dyn_param`.
    pub dynamic: bool,
    /// The literal answer, or the `dyn_param` key if `dynamic`.
    pub value: String,
    /// Whether the prompt line stays in the command output.
    pub record: bool,
}

impl InputSpec {
    pub fn fixed(value: impl Into<String>) -> Self {
        Self {
            dynamic: false,
            value: value.into(),
            record: false,
        }
    }

    pub fn param(key: impl Into<String>) -> Self {
        Self {
            dynamic: true,
            value: key.into(),
            record: false,
        }
    }
}

/// Answer the session must send for an input prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    pub state: String,
    pub input: String,
    pub record: bool,
}

pub struct PromptMatcher {
    /// Index of the current state in `all_states`
    current_state_index: usize,

    all_states: Vec<String>,

    /// Combined regex set for every state pattern
    all_regex: RegexSet,

    /// Maps regex match index to state index
    regex_index_map: HashMap<usize, usize>,

    /// Index range for prompt states in `all_states` (start, end)
    prompt_index: (usize, usize),

    input_map: HashMap<String, InputSpec>,

    /// Error lines that should not fail a command
    ignore_errors: Option<RegexSet>,

    /// Values for dynamic input states (username, password)
    pub dyn_param: HashMap<String, String>,

    /// Last prompt text matched by the state machine.
    current_prompt: Option<String>,
}

impl PromptMatcher {
    /// Creates a matcher.
    ///
    /// Prompt patterns get the `^\x00*\r?` prefix so that prompts printed
    /// after NUL padding or a bare carriage return still match. Earlier
    /// prompt states win when a line matches more than one.
    pub fn new<S>(
        prompts: Vec<(String, Vec<S>)>,
        inputs: Vec<(String, InputSpec, Vec<S>)>,
        more_regex: Vec<S>,
        error_regex: Vec<S>,
        ignore_errors: Vec<S>,
        dyn_param: HashMap<String, String>,
    ) -> Result<PromptMatcher, VerifyError>
    where
        S: AsRef<str>,
    {
        let mut all_states: Vec<String> = PRE_STATE
            .iter()
            .map(|s| s.to_ascii_lowercase())
            .collect();

        let mut regexs: Vec<String> = Vec::new();
        let mut regex_index_map = HashMap::new();

        for pattern in more_regex {
            regex_index_map.insert(regexs.len(), 1);
            regexs.push(pattern.as_ref().to_string());
        }

        for pattern in error_regex {
            regex_index_map.insert(regexs.len(), 2);
            regexs.push(pattern.as_ref().to_string());
        }

        let prompt_start = all_states.len();
        for (state, patterns) in prompts {
            let state_index = all_states.len();
            all_states.push(state.to_ascii_lowercase());
            for pattern in patterns {
                regex_index_map.insert(regexs.len(), state_index);
                regexs.push(format!(
                    r"^\x00*\r{{0,1}}{}",
                    pattern.as_ref().trim_start_matches('^')
                ));
            }
        }
        if all_states.len() == prompt_start {
            return Err(VerifyError::InvalidPromptConfig(
                "at least one prompt state is required".to_string(),
            ));
        }
        let prompt_index = (prompt_start, all_states.len() - 1);

        let mut input_map = HashMap::new();
        for (state, spec, patterns) in inputs {
            let state_index = all_states.len();
            all_states.push(state.to_ascii_lowercase());
            for pattern in patterns {
                regex_index_map.insert(regexs.len(), state_index);
                regexs.push(pattern.as_ref().to_string());
            }
            input_map.insert(state.to_ascii_lowercase(), spec);
        }

        // Pagination is answered with a space and never recorded.
        input_map.insert(MORE_STATE.to_string(), InputSpec::fixed(" "));

        let all_regex = RegexSet::new(&regexs).map_err(|err| {
            VerifyError::InvalidPromptConfig(format!("failed to build state regex set: {err}"))
        })?;

        let ignore_errors = if ignore_errors.is_empty() {
            None
        } else {
            Some(
                RegexSet::new(ignore_errors.iter().map(|s| s.as_ref())).map_err(|err| {
                    VerifyError::InvalidPromptConfig(format!(
                        "invalid ignore_errors regex set: {err}"
                    ))
                })?,
            )
        };

        Ok(Self {
            current_state_index: 0,
            all_states,
            all_regex,
            regex_index_map,
            prompt_index,
            input_map,
            ignore_errors,
            dyn_param,
            current_prompt: None,
        })
    }

    /// Builds the matcher described by a CLI template.
    ///
    /// Config prompts are registered before exec prompts.
    pub fn from_template(
        template: &CliTemplate,
        dyn_param: HashMap<String, String>,
    ) -> Result<PromptMatcher, VerifyError> {
        Self::new(
            vec![
                (CONFIG_STATE.to_string(), template.config_prompts.clone()),
                (EXEC_STATE.to_string(), template.exec_prompts.clone()),
            ],
            vec![
                (
                    USERNAME_STATE.to_string(),
                    InputSpec::param(USERNAME_STATE),
                    template.username_prompts.clone(),
                ),
                (
                    PASSWORD_STATE.to_string(),
                    InputSpec::param(PASSWORD_STATE),
                    template.password_prompts.clone(),
                ),
                (
                    CONFIRM_STATE.to_string(),
                    InputSpec::fixed(template.confirm_answer.clone()),
                    template.confirm_prompts.clone(),
                ),
            ],
            template.more_patterns.clone(),
            template.error_patterns.clone(),
            template.ignore_errors.clone(),
            dyn_param,
        )
    }

    /// Converts a line of output to a state index and name.
    ///
    /// Lines that match nothing are plain output.
    fn line2state(&self, line: &str) -> (usize, &str) {
        let index = match self.all_regex.matches(line).into_iter().next() {
            Some(v) => v,
            None => return (0, self.state_name(0)),
        };
        let state_index = self.regex_index_map.get(&index).copied().unwrap_or(0);
        (state_index, self.state_name(state_index))
    }

    fn state_name(&self, index: usize) -> &str {
        self.all_states
            .get(index)
            .map(|s| s.as_str())
            .unwrap_or("output")
    }

    /// Reads one line of output and updates the current state.
    pub fn read(&mut self, line: &str) {
        trace!("Read line: '{:?}'", line);
        let (state_index, state) = self.line2state(line);
        trace!("Converted to state: '{:?}'", state);
        if self.ignore_error(line) {
            trace!("Ignoring error state");
            self.current_state_index = 0;
            return;
        }
        if self.match_prompt(state_index) {
            self.current_prompt = Some(line.to_string());
        }
        self.current_state_index = state_index;
    }

    fn ignore_error(&self, line: &str) -> bool {
        self.ignore_errors
            .as_ref()
            .map(|set| set.is_match(line))
            .unwrap_or(false)
    }

    fn match_prompt(&self, index: usize) -> bool {
        let (start, end) = self.prompt_index;
        index >= start && index <= end
    }

    /// True if `line` is any prompt, without changing state.
    pub fn read_prompt(&self, line: &str) -> bool {
        trace!("Checking if line is a prompt: '{:?}'", line);
        let (index, _) = self.line2state(line);
        self.match_prompt(index)
    }

    /// Returns the answer to send if `line` is an input prompt.
    ///
    /// Dynamic inputs whose parameter is missing yield `None`.
    pub fn read_need_write(&self, line: &str) -> Option<InputRequest> {
        trace!("Checking if input is required: '{:?}'", line);
        let (_, state) = self.line2state(line);
        let spec = self.input_map.get(state)?;
        let input = if spec.dynamic {
            self.dyn_param.get(&spec.value)?.clone()
        } else {
            spec.value.clone()
        };
        Some(InputRequest {
            state: state.to_string(),
            input,
            record: spec.record,
        })
    }

    pub fn current_state(&self) -> &str {
        self.state_name(self.current_state_index)
    }

    /// Last prompt line matched by the state machine.
    pub fn current_prompt(&self) -> Option<&str> {
        self.current_prompt.as_deref()
    }

    pub fn states(&self) -> Vec<String> {
        self.all_states.clone()
    }

    /// True if the last line read was an in-band error.
    pub fn error(&self) -> bool {
        self.current_state_index == 2
    }

    pub fn in_config_mode(&self) -> bool {
        self.current_state() == CONFIG_STATE
    }
}

/// Matches carriage returns and backspaces at the start of terminal lines.
pub static IGNORE_START_LINE: Lazy<Regex> =
    Lazy::new(
        || match Regex::new(r"^(\r+(\s+\r+)*)|(\u{8}+(\s+\u{8}+)*)") {
            Ok(re) => re,
            Err(err) => panic!("invalid IGNORE_START_LINE regex: {err}"),
        },
    );
