//! Python source emitter for module descriptors.

use super::descriptors::{ClassDescriptor, FunctionDescriptor, FunctionSummary, ModuleSpec};

const INDENT: &str = "    ";

/// Emit a module body. Definitions keep their declaration order and are
/// separated by two blank lines.
pub fn emit_module(spec: &ModuleSpec) -> String {
    let mut out = String::new();

    if let Some(doc) = non_empty(&spec.docstring) {
        out.push_str(&format!("\"\"\"{}\"\"\"\n", doc));
    }

    if !spec.imports.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        for import in &spec.imports {
            out.push_str(import);
            out.push('\n');
        }
    }

    for function in &spec.functions {
        separate(&mut out);
        emit_function(&mut out, function, "", false);
    }

    for class in &spec.classes {
        separate(&mut out);
        emit_class(&mut out, class);
    }

    out
}

fn separate(out: &mut String) {
    if !out.is_empty() {
        out.push_str("\n\n");
    }
}

fn emit_function(out: &mut String, function: &FunctionDescriptor, indent: &str, method: bool) {
    let mut params: Vec<&str> = Vec::with_capacity(function.params.len() + 1);
    if method {
        params.push("self");
    }
    params.extend(function.params.iter().map(String::as_str));

    out.push_str(&format!("{}def {}({})", indent, function.name, params.join(", ")));
    if let Some(ret) = non_empty(&function.return_type) {
        out.push_str(&format!(" -> {}", ret));
    }
    out.push_str(":\n");

    let body_indent = format!("{}{}", indent, INDENT);
    if let Some(doc) = non_empty(&function.docstring) {
        out.push_str(&format!("{}\"\"\"{}\"\"\"\n", body_indent, doc));
    }

    if function.body.is_empty() {
        out.push_str(&format!("{}raise NotImplementedError\n", body_indent));
    } else {
        for line in &function.body {
            if line.trim().is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("{}{}\n", body_indent, line));
            }
        }
    }
}

fn emit_class(out: &mut String, class: &ClassDescriptor) {
    out.push_str(&format!("class {}", class.name));
    if !class.bases.is_empty() {
        out.push_str(&format!("({})", class.bases.join(", ")));
    }
    out.push_str(":\n");

    let doc = non_empty(&class.docstring);
    if let Some(doc) = doc {
        out.push_str(&format!("{}\"\"\"{}\"\"\"\n", INDENT, doc));
    }

    if class.methods.is_empty() {
        if doc.is_none() {
            out.push_str(&format!("{}pass\n", INDENT));
        }
        return;
    }

    for (i, method) in class.methods.iter().enumerate() {
        if i > 0 || doc.is_some() {
            out.push('\n');
        }
        emit_function(out, method, INDENT, true);
    }
}

/// Top-level `def`s in Python source, with their one-line docstrings
pub fn scan_functions(code: &str) -> Vec<FunctionSummary> {
    let lines: Vec<&str> = code.lines().collect();
    let mut found = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let Some(rest) = line.strip_prefix("def ") else {
            continue;
        };
        let Some(open) = rest.find('(') else {
            continue;
        };
        let signature = rest.trim_end().trim_end_matches(':').trim_end().to_string();
        let docstring = lines
            .get(i + 1)
            .map(|next| next.trim())
            .and_then(|next| next.strip_prefix("\"\"\""))
            .and_then(|next| next.strip_suffix("\"\"\""))
            .unwrap_or_default()
            .to_string();

        found.push(FunctionSummary {
            name: rest[..open].trim().to_string(),
            signature,
            docstring,
        });
    }

    found
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}
