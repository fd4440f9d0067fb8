//! Scalpel - HTML tag scanner and tree builder
//!
//! Usage: scalpel [OPTIONS] <FILE>

use std::env;
use std::error::Error;
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use log::debug;
use serde_json::{json, Map, Value};

use scalpel_dom::{AttributeValue, DomTree, NodeId, NodeType};
use scalpel_html::{escape_attribute, HtmlParser, TagProcessor, TagQuery};

const VERSION: &str = env!("CARGO_PKG_VERSION");

type CliResult = Result<(), Box<dyn Error>>;

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("scalpel", String::as_str);

    let Some(command) = args.get(1) else {
        print_usage(program);
        return ExitCode::FAILURE;
    };
    let rest = &args[2..];

    let result = match command.as_str() {
        "--help" | "-h" => {
            print_usage(program);
            return ExitCode::SUCCESS;
        }
        "--version" | "-V" => {
            println!("Scalpel {}", VERSION);
            return ExitCode::SUCCESS;
        }
        "--tree" => match rest {
            [file] => show_tree(file, false),
            [file, flag] if flag == "--json" => show_tree(file, true),
            _ => usage_error(program, "--tree <FILE> [--json]"),
        },
        "--tags" => match rest {
            [file] => show_tags(file, None),
            [file, tag] => show_tags(file, Some(tag)),
            _ => usage_error(program, "--tags <FILE> [TAG]"),
        },
        "--add-class" => match rest {
            [tag, class_name, file] => {
                read_input(file).map(|html| print!("{}", add_class(&html, tag, class_name)))
            }
            _ => usage_error(program, "--add-class <TAG> <CLASS> <FILE>"),
        },
        "--remove-attribute" => match rest {
            [tag, attribute, file] => {
                read_input(file).map(|html| print!("{}", remove_attribute(&html, tag, attribute)))
            }
            _ => usage_error(program, "--remove-attribute <TAG> <ATTR> <FILE>"),
        },
        other => Err(format!("Unknown option: {} (see {} --help)", other, program).into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage(program: &str) {
    println!(
        r#"Scalpel {} - HTML tag scanner and tree builder

USAGE:
    {} <COMMAND> [ARGS]

COMMANDS:
    -h, --help                                Print this help message
    -V, --version                             Print version information
    --tree <FILE> [--json]                    Print the compat mode and the parsed tree
    --tags <FILE> [TAG]                       List tags and their attributes
    --add-class <TAG> <CLASS> <FILE>          Add a class to every matching tag
    --remove-attribute <TAG> <ATTR> <FILE>    Remove an attribute from every matching tag

A FILE of "-" reads standard input.

EXAMPLES:
    {} --tree page.html
    {} --tags page.html img
    {} --add-class p lead page.html
"#,
        VERSION, program, program, program, program
    );
}

fn usage_error(program: &str, usage: &str) -> CliResult {
    Err(format!("Usage: {} {}", program, usage).into())
}

fn read_input(path: &str) -> Result<String, Box<dyn Error>> {
    if path == "-" {
        let mut html = String::new();
        io::stdin()
            .read_to_string(&mut html)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        return Ok(html);
    }
    fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e).into())
}

fn show_tree(path: &str, as_json: bool) -> CliResult {
    let html = read_input(path)?;
    let tree = HtmlParser::new().parse(&html)?;
    debug!("parsed {} bytes into {} nodes", html.len(), tree.len());

    if as_json {
        println!("{}", serde_json::to_string_pretty(&tree_to_json(&tree))?);
    } else {
        println!("Compat mode: {}\n", tree.compat_mode());
        print!("{}", tree.pretty_print());
    }
    Ok(())
}

fn show_tags(path: &str, tag: Option<&String>) -> CliResult {
    let html = read_input(path)?;
    print!("{}", describe_tags(&html, tag.map(String::as_str)));
    Ok(())
}

/// One line per matched opener: lowercased name, then its decoded attributes
fn describe_tags(html: &str, tag: Option<&str>) -> String {
    let query = tag.map_or_else(TagQuery::any, TagQuery::tag);
    let mut processor = TagProcessor::new(html);
    let mut output = String::new();

    while processor.next_tag(query.clone()) {
        let Some(name) = processor.get_tag() else {
            continue;
        };
        output.push_str(&name.to_ascii_lowercase());
        for (attribute, value) in processor.attributes() {
            match value {
                AttributeValue::Text(text) => {
                    let _ = write!(output, " {}=\"{}\"", attribute, escape_attribute(&text));
                }
                AttributeValue::True => {
                    let _ = write!(output, " {}", attribute);
                }
            }
        }
        output.push('\n');
    }
    output
}

fn add_class(html: &str, tag: &str, class_name: &str) -> String {
    let mut processor = TagProcessor::new(html);
    let mut changed = 0;
    while processor.next_tag(tag) {
        if processor.add_class(class_name) {
            changed += 1;
        }
    }
    debug!("added class {:?} to {} tags", class_name, changed);
    processor.get_updated_html()
}

fn remove_attribute(html: &str, tag: &str, attribute: &str) -> String {
    let mut processor = TagProcessor::new(html);
    let mut changed = 0;
    while processor.next_tag(tag) {
        if processor.remove_attribute(attribute) {
            changed += 1;
        }
    }
    debug!("removed {:?} from {} tags", attribute, changed);
    processor.get_updated_html()
}

fn tree_to_json(tree: &DomTree) -> Value {
    json!({
        "compatMode": tree.compat_mode().to_string(),
        "children": children_to_json(tree, tree.document_id()),
    })
}

fn children_to_json(tree: &DomTree, id: NodeId) -> Vec<Value> {
    tree.children(id)
        .into_iter()
        .map(|child| node_to_json(tree, child))
        .collect()
}

fn node_to_json(tree: &DomTree, id: NodeId) -> Value {
    match tree.get(id).map(|node| &node.node_type) {
        Some(NodeType::Element(element)) => {
            let attributes: Map<String, Value> = element
                .attributes
                .iter()
                .map(|(name, value)| {
                    let value = match value {
                        AttributeValue::Text(text) => Value::String(text.clone()),
                        AttributeValue::True => Value::Bool(true),
                    };
                    (name.clone(), value)
                })
                .collect();
            json!({
                "tag": element.tag_name,
                "attributes": attributes,
                "children": children_to_json(tree, id),
            })
        }
        Some(NodeType::Text(text)) => json!({ "text": text }),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_tags() {
        let html = r#"<p class="a">x</p><img src="a&amp;b.png" hidden><P>"#;
        assert_eq!(
            describe_tags(html, None),
            "p class=\"a\"\nimg src=\"a&amp;b.png\" hidden\np\n"
        );
        assert_eq!(describe_tags(html, Some("p")), "p class=\"a\"\np\n");
    }

    #[test]
    fn test_add_class() {
        let html = r#"<p>a</p><div><p class="x">b</p></div>"#;
        assert_eq!(
            add_class(html, "p", "lead"),
            r#"<p class="lead">a</p><div><p class="x lead">b</p></div>"#
        );
    }

    #[test]
    fn test_remove_attribute() {
        let html = r#"<a href="x" rel="nofollow">a</a><a rel=me>b</a>"#;
        assert_eq!(
            remove_attribute(html, "a", "rel"),
            r#"<a href="x" >a</a><a >b</a>"#
        );
    }

    #[test]
    fn test_tree_to_json() {
        let tree = HtmlParser::new().parse(r#"<!DOCTYPE html><p id="x" hidden>hi"#).unwrap();
        let value = tree_to_json(&tree);
        assert_eq!(value["compatMode"], "no-quirks");
        let paragraph = &value["children"][0];
        assert_eq!(paragraph["tag"], "p");
        assert_eq!(paragraph["attributes"]["id"], "x");
        assert_eq!(paragraph["attributes"]["hidden"], true);
        assert_eq!(paragraph["children"][0]["text"], "hi");
    }
}
