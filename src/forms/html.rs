use std::collections::HashMap;

use super::schema::{format_loc, FieldType, FormDoc, FormField, FormSchema, ValidationError};

const SITE_NAME: &str = "BeanHub Forms";

pub fn escape(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            c => output.push(c),
        }
    }
    output
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
    <head>
        <meta charset="utf-8">
        <title>{title} - {SITE_NAME}</title>
    </head>
    <body>
        <nav><a href="/">{SITE_NAME}</a></nav>
        <main>
            <h1>{title}</h1>
{body}
        </main>
        <footer>beanhub-cli {version}</footer>
    </body>
</html>
"#,
        title = escape(title),
        version = env!("CARGO_PKG_VERSION"),
    )
}

pub fn home_page(doc: Option<&FormDoc>) -> String {
    let forms = doc.map(|doc| doc.forms.as_slice()).unwrap_or_default();
    if forms.is_empty() {
        return page("Forms", "<p>No form definitions found</p>");
    }
    let items: String = forms
        .iter()
        .map(|form| {
            format!(
                "<li><a href=\"/form/{name}\">{title}</a></li>\n",
                name = escape(&form.name),
                title = escape(form.title())
            )
        })
        .collect();
    page("Forms", &format!("<ul>\n{items}</ul>"))
}

pub fn errors_page(errors: &[ValidationError]) -> String {
    if errors.is_empty() {
        return page("Form document errors", "<p>The form document is valid</p>");
    }
    let items: String = errors
        .iter()
        .map(|error| {
            let loc = format_loc(&error.loc);
            format!(
                "<li><code>{}</code> {}</li>\n",
                escape(if loc.is_empty() { "document" } else { loc.as_str() }),
                escape(&error.msg)
            )
        })
        .collect();
    page("Form document errors", &format!("<ul>\n{items}</ul>"))
}

pub fn form_page(
    schema: &FormSchema,
    values: &HashMap<String, String>,
    errors: &[String],
    message: Option<&str>,
) -> String {
    let mut body = String::new();
    if let Some(message) = message {
        body.push_str(&format!("<p class=\"success\">{}</p>\n", escape(message)));
    }
    if !errors.is_empty() {
        body.push_str("<ul class=\"errors\">\n");
        for error in errors {
            body.push_str(&format!("<li>{}</li>\n", escape(error)));
        }
        body.push_str("</ul>\n");
    }
    body.push_str(&format!(
        "<form method=\"post\" action=\"/form/{}\">\n",
        escape(&schema.name)
    ));
    for field in &schema.fields {
        let value = values
            .get(&field.name)
            .or(field.default.as_ref())
            .map(String::as_str)
            .unwrap_or_default();
        body.push_str(&field_html(field, value));
    }
    body.push_str("<button type=\"submit\">Submit</button>\n</form>");
    page(schema.title(), &body)
}

fn field_html(field: &FormField, value: &str) -> String {
    let name = escape(&field.name);
    let value = escape(value);
    let required = if field.required { " required" } else { "" };
    let input = match field.field_type {
        FieldType::Text => {
            format!("<textarea id=\"{name}\" name=\"{name}\"{required}>{value}</textarea>")
        }
        field_type => {
            let input_type = match field_type {
                FieldType::Number => "number\" step=\"any",
                FieldType::Date => "date",
                _ => "text",
            };
            format!(
                "<input id=\"{name}\" name=\"{name}\" type=\"{input_type}\" value=\"{value}\"{required}>"
            )
        }
    };
    format!(
        "<p><label for=\"{name}\">{label}</label> {input}</p>\n",
        label = escape(field.label())
    )
}
