//! Structural descriptors for programmatic code generation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::CodegenError;

/// A function to emit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,

    /// Parameters as written, e.g. `"n: int"`
    #[serde(default)]
    pub params: Vec<String>,

    #[serde(default)]
    pub docstring: Option<String>,

    /// Body lines, without indentation
    #[serde(default)]
    pub body: Vec<String>,

    #[serde(default)]
    pub return_type: Option<String>,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.body.push(line.into());
        self
    }

    /// Call signature without the `def` keyword, e.g. `factorial(n: int) -> int`
    pub fn signature(&self) -> String {
        let mut sig = format!("{}({})", self.name, self.params.join(", "));
        if let Some(ret) = self.return_type.as_deref().filter(|r| !r.is_empty()) {
            sig.push_str(" -> ");
            sig.push_str(ret);
        }
        sig
    }
}

/// Name, signature and docstring of a function, as shown in docs and tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub name: String,
    pub signature: String,
    #[serde(default)]
    pub docstring: String,
}

impl FunctionSummary {
    pub fn of(function: &FunctionDescriptor) -> Self {
        Self {
            name: function.name.clone(),
            signature: function.signature(),
            docstring: function.docstring.clone().unwrap_or_default(),
        }
    }
}

/// A class to emit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,

    #[serde(default)]
    pub bases: Vec<String>,

    #[serde(default)]
    pub docstring: Option<String>,

    /// Methods; `self` is added automatically
    #[serde(default)]
    pub methods: Vec<FunctionDescriptor>,
}

/// A whole module: imports, then functions, then classes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Dotted module name; becomes the artifact name
    pub name: String,

    #[serde(default)]
    pub docstring: Option<String>,

    /// Import lines as written, e.g. `"import math"`
    #[serde(default)]
    pub imports: Vec<String>,

    #[serde(default)]
    pub functions: Vec<FunctionDescriptor>,

    #[serde(default)]
    pub classes: Vec<ClassDescriptor>,
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_function(mut self, function: FunctionDescriptor) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_class(mut self, class: ClassDescriptor) -> Self {
        self.classes.push(class);
        self
    }

    pub fn with_import(mut self, import: impl Into<String>) -> Self {
        self.imports.push(import.into());
        self
    }

    /// Check names: non-empty identifiers, unique among top-level
    /// definitions and among the methods of each class. A method may not
    /// reuse a top-level function name, so every `def` of a module-level
    /// function appears once; methods of different classes may share names.
    pub fn validate(&self) -> Result<(), CodegenError> {
        if self.name.is_empty() || !self.name.split('.').all(is_identifier) {
            return Err(CodegenError::InvalidDescriptor(format!(
                "invalid module name '{}'",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        let top_level = self
            .functions
            .iter()
            .map(|f| f.name.as_str())
            .chain(self.classes.iter().map(|c| c.name.as_str()));
        for name in top_level {
            check_name(name, &self.name, &mut seen)?;
        }

        let functions: HashSet<&str> = self.functions.iter().map(|f| f.name.as_str()).collect();
        for class in &self.classes {
            let mut methods = HashSet::new();
            for method in &class.methods {
                check_name(&method.name, &class.name, &mut methods)?;
                if functions.contains(method.name.as_str()) {
                    return Err(CodegenError::InvalidDescriptor(format!(
                        "method '{}.{}' shadows function '{}' in '{}'",
                        class.name, method.name, method.name, self.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn check_name<'a>(
    name: &'a str,
    scope: &str,
    seen: &mut HashSet<&'a str>,
) -> Result<(), CodegenError> {
    if name.is_empty() {
        return Err(CodegenError::InvalidDescriptor(format!(
            "empty name in '{}'",
            scope
        )));
    }
    if !is_identifier(name) {
        return Err(CodegenError::InvalidDescriptor(format!(
            "'{}' in '{}' is not a valid identifier",
            name, scope
        )));
    }
    if !seen.insert(name) {
        return Err(CodegenError::InvalidDescriptor(format!(
            "duplicate name '{}' in '{}'",
            name, scope
        )));
    }
    Ok(())
}

/// ASCII identifier: a letter or underscore, then letters, digits or underscores
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
