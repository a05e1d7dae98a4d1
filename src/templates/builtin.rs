//! Templates shipped with the binary.
//!
//! A user template directory is layered on top of these, so any of them can
//! be overridden by dropping a file with the same dotted name into it.

use super::MemorySource;

const PYTHON_CLASS: &str = r#"class {{ class_name }}{% if bases is defined and bases %}({{ bases | join(sep=", ") }}){% endif %}:
    """{% if docstring is defined and docstring %}{{ docstring }}{% else %}{{ class_name }} class.{% endif %}"""

    def __init__(self{% if constructor_params is defined %}{% for param in constructor_params %}, {{ param }}{% endfor %}{% endif %}) -> None:
{%- if constructor_params is defined and constructor_params %}
{%- for param in constructor_params %}
        self.{{ param | split(pat=":") | first | trim }} = {{ param | split(pat=":") | first | trim }}
{%- endfor %}
{%- else %}
        pass
{%- endif %}
{%- if methods is defined %}
{%- for method in methods %}

    def {{ method.name }}(self{% if method.params is defined %}{% for p in method.params %}, {{ p }}{% endfor %}{% endif %}):
        raise NotImplementedError
{%- endfor %}
{%- endif %}
"#;

const PYTHON_FUNCTION: &str = r#"def {{ name }}({% if params is defined %}{{ params | join(sep=", ") }}{% endif %}){% if return_type is defined and return_type %} -> {{ return_type }}{% endif %}:
{%- if docstring is defined and docstring %}
    """{{ docstring }}"""
{%- endif %}
{%- if body is defined and body %}
{%- for line in body %}
    {{ line }}
{%- endfor %}
{%- else %}
    raise NotImplementedError
{%- endif %}
"#;

const PYTHON_MODULE: &str = r#""""{% if docstring is defined and docstring %}{{ docstring }}{% else %}{{ module_name }} module.{% endif %}"""
{%- if imports is defined and imports %}
{% for imp in imports %}
{{ imp }}
{%- endfor %}
{%- endif %}
{%- if body is defined and body %}


{{ body }}
{%- endif %}
"#;

const PYTHON_TEST: &str = r#"import unittest
{% if functions %}
from {{ module }} import {% for function in functions %}{{ function.name }}{% if not loop.last %}, {% endif %}{% endfor %}
{% endif %}

class Test{{ class_name }}(unittest.TestCase):
{%- if not functions %}
    pass
{%- endif %}
{%- for function in functions %}
{%- if function.cases is defined and function.cases %}
{%- for case in function.cases %}

    def test_{{ function.name }}_{{ loop.index }}(self):
        self.assertEqual({{ case.call }}, {{ case.expected }})
{%- endfor %}
{%- else %}

    def test_{{ function.name }}_is_callable(self):
        self.assertTrue(callable({{ function.name }}))
{%- endif %}
{%- endfor %}


if __name__ == "__main__":
    unittest.main()
"#;

const MARKDOWN_MODULE_DOC: &str = r#"# {{ title }}

{{ summary }}
{%- if functions %}

## Functions
{%- for function in functions %}

### `{{ function.signature }}`
{%- if function.docstring %}

{{ function.docstring }}
{%- endif %}
{%- endfor %}
{%- endif %}
{%- if include_source %}

## Source

```{{ language }}
{{ code }}
```
{%- endif %}
"#;

const MARKDOWN_README: &str = r#"# {{ project_name }}

{{ description }}
{%- if requirements %}

## Requirements

{{ requirements }}
{%- endif %}
"#;

/// Names and sources of every built-in template
pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("markdown.module_doc", MARKDOWN_MODULE_DOC),
    ("markdown.readme", MARKDOWN_README),
    ("python.class", PYTHON_CLASS),
    ("python.function", PYTHON_FUNCTION),
    ("python.module", PYTHON_MODULE),
    ("python.test", PYTHON_TEST),
];

/// In-memory source holding the built-in templates
pub fn builtin_source() -> MemorySource {
    BUILTIN_TEMPLATES
        .iter()
        .map(|(name, source)| (name.to_string(), source.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::{render, TemplateSource};
    use serde_json::json;

    fn render_builtin(name: &str, context: serde_json::Value) -> String {
        let source = builtin_source().load(name).unwrap();
        render(&source, &context).unwrap()
    }

    #[test]
    fn test_all_builtins_registered() {
        assert_eq!(
            builtin_source().names(),
            vec![
                "markdown.module_doc",
                "markdown.readme",
                "python.class",
                "python.function",
                "python.module",
                "python.test",
            ]
        );
    }

    #[test]
    fn test_python_class_constructor() {
        let out = render_builtin(
            "python.class",
            json!({"class_name": "Person", "constructor_params": ["name: str"]}),
        );

        assert_eq!(
            out,
            "class Person:\n    \"\"\"Person class.\"\"\"\n\n    def __init__(self, name: str) -> None:\n        self.name = name\n"
        );
    }

    #[test]
    fn test_python_class_without_params() {
        let out = render_builtin(
            "python.class",
            json!({"class_name": "Empty", "docstring": "Nothing here."}),
        );

        assert!(out.contains("\"\"\"Nothing here.\"\"\""));
        assert!(out.contains("def __init__(self) -> None:\n        pass"));
    }

    #[test]
    fn test_python_function_body_and_stub() {
        let out = render_builtin(
            "python.function",
            json!({
                "name": "double",
                "params": ["x: int"],
                "return_type": "int",
                "body": ["return x * 2"],
            }),
        );
        assert_eq!(out, "def double(x: int) -> int:\n    return x * 2\n");

        let stub = render_builtin("python.function", json!({"name": "todo"}));
        assert_eq!(stub, "def todo():\n    raise NotImplementedError\n");
    }

    #[test]
    fn test_python_test_cases() {
        let out = render_builtin(
            "python.test",
            json!({
                "module": "factorial",
                "class_name": "Factorial",
                "functions": [{
                    "name": "factorial",
                    "cases": [{"call": "factorial(5)", "expected": "120"}],
                }],
            }),
        );

        assert!(out.contains("from factorial import factorial"));
        assert!(out.contains("class TestFactorial(unittest.TestCase):"));
        assert!(out.contains("self.assertEqual(factorial(5), 120)"));
    }

    #[test]
    fn test_module_doc_lists_functions() {
        let out = render_builtin(
            "markdown.module_doc",
            json!({
                "title": "factorial",
                "summary": "Factorial helpers.",
                "language": "python",
                "functions": [{"name": "factorial", "signature": "factorial(n: int) -> int", "docstring": ""}],
                "include_source": false,
                "code": "",
            }),
        );

        assert!(out.starts_with("# factorial\n\nFactorial helpers."));
        assert!(out.contains("### `factorial(n: int) -> int`"));
        assert!(!out.contains("## Source"));
    }

    #[test]
    fn test_readme_omits_empty_requirements() {
        let out = render_builtin(
            "markdown.readme",
            json!({"project_name": "demo", "description": "A demo.", "requirements": ""}),
        );
        assert_eq!(out, "# demo\n\nA demo.\n");
    }
}
