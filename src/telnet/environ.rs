//! NEW-ENVIRON sub-option (RFC 1572)
//!
//! The host asks for variables with `SEND [VAR name | USERVAR name]...`; we answer
//! `IS` from a small fixed table. An empty `SEND` means "send everything".

pub const ENV_IS: u8 = 0;
pub const ENV_SEND: u8 = 1;
pub const ENV_INFO: u8 = 2;

pub const ENV_VAR: u8 = 0;
pub const ENV_VALUE: u8 = 1;
pub const ENV_ESC: u8 = 2;
pub const ENV_USERVAR: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Var,
    UserVar,
}

impl VarKind {
    fn code(self) -> u8 {
        match self {
            VarKind::Var => ENV_VAR,
            VarKind::UserVar => ENV_USERVAR,
        }
    }
}

/// Variables offered to the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: Vec<(String, String)>,
    user_vars: Vec<(String, String)>,
}

impl Environment {
    /// Build the table: `USER` as a well-known variable, `DEVNAME` as a user
    /// variable when a device name is configured.
    pub fn new(user: Option<String>, devname: Option<String>) -> Self {
        let mut env = Self::default();
        if let Some(user) = user.filter(|u| !u.is_empty()) {
            env.vars.push(("USER".to_string(), user));
        }
        if let Some(devname) = devname.filter(|d| !d.is_empty()) {
            env.user_vars.push(("DEVNAME".to_string(), devname));
        }
        env
    }

    pub fn add_user_var(&mut self, name: &str, value: &str) {
        self.user_vars.push((name.to_string(), value.to_string()));
    }

    fn lookup(&self, kind: VarKind, name: &[u8]) -> Option<&str> {
        let table = match kind {
            VarKind::Var => &self.vars,
            VarKind::UserVar => &self.user_vars,
        };
        table
            .iter()
            .find(|(n, _)| n.as_bytes() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Answer a request. `request` is the sub-negotiation body following the
    /// option byte; the result is the body of the `IS` reply, or `None` if the
    /// request is not a `SEND`.
    pub fn reply(&self, request: &[u8]) -> Option<Vec<u8>> {
        let (&verb, rest) = request.split_first()?;
        if verb != ENV_SEND {
            return None;
        }

        let wanted = parse_names(rest);
        let mut out = vec![ENV_IS];

        if wanted.is_empty() {
            for (name, value) in &self.vars {
                push_entry(&mut out, VarKind::Var, name.as_bytes(), Some(value));
            }
            for (name, value) in &self.user_vars {
                push_entry(&mut out, VarKind::UserVar, name.as_bytes(), Some(value));
            }
            return Some(out);
        }

        for (kind, name) in wanted {
            if name.is_empty() {
                // A bare VAR or USERVAR asks for every variable of that kind
                let table = match kind {
                    VarKind::Var => &self.vars,
                    VarKind::UserVar => &self.user_vars,
                };
                for (n, v) in table {
                    push_entry(&mut out, kind, n.as_bytes(), Some(v));
                }
            } else {
                let value = self.lookup(kind, &name);
                push_entry(&mut out, kind, &name, value);
            }
        }
        Some(out)
    }
}

/// Split the name list of a SEND request, honouring ESC.
fn parse_names(data: &[u8]) -> Vec<(VarKind, Vec<u8>)> {
    let mut names: Vec<(VarKind, Vec<u8>)> = Vec::new();
    let mut escaped = false;
    for &byte in data {
        if escaped {
            if let Some((_, name)) = names.last_mut() {
                name.push(byte);
            }
            escaped = false;
            continue;
        }
        match byte {
            ENV_VAR => names.push((VarKind::Var, Vec::new())),
            ENV_USERVAR => names.push((VarKind::UserVar, Vec::new())),
            ENV_ESC => escaped = true,
            _ => {
                if let Some((_, name)) = names.last_mut() {
                    name.push(byte);
                }
            }
        }
    }
    names
}

fn push_escaped(out: &mut Vec<u8>, data: &[u8]) {
    for &byte in data {
        if matches!(byte, ENV_VAR | ENV_VALUE | ENV_ESC | ENV_USERVAR) {
            out.push(ENV_ESC);
        }
        out.push(byte);
    }
}

fn push_entry(out: &mut Vec<u8>, kind: VarKind, name: &[u8], value: Option<&str>) {
    out.push(kind.code());
    push_escaped(out, name);
    if let Some(value) = value {
        out.push(ENV_VALUE);
        push_escaped(out, value.as_bytes());
    }
}
