//! Command-line interface for xmlschema-compiler

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use xmlschema_compiler::components::{Category, ComponentId};
#[cfg(feature = "cli")]
use xmlschema_compiler::derivation::ContentTypeLabel;
#[cfg(feature = "cli")]
use xmlschema_compiler::locations::Location;
#[cfg(feature = "cli")]
use xmlschema_compiler::{Compiler, ComponentModel, ContentModel, Document, FileRetriever, ValidationMode};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "xsdc")]
#[command(author, version, about = "XML Schema compiler and validator", long_about = None)]
struct Cli {
    /// Log compilation stages (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a schema and display its components and content models
    Inspect {
        /// Path to the XSD schema file
        #[arg(value_name = "SCHEMA")]
        schema: PathBuf,

        /// Show the compiled content model of a global type
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Validate an XML document against an XSD schema
    Validate {
        /// Path to the XSD schema file
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// Path to the XML file to validate
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Validation mode: strict (first error) or lazy (all errors)
        #[arg(short, long, default_value = "lazy")]
        mode: String,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Inspect {
            schema,
            type_name,
            json,
        } => cmd_inspect(schema, type_name, json),
        Commands::Validate { schema, file, mode } => cmd_validate(schema, file, mode),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "cli")]
fn load_schema(path: &PathBuf) -> Result<ComponentModel, Box<dyn std::error::Error>> {
    let retriever = FileRetriever::new();
    let location = Location::Path(path.clone());
    let text = retriever.load(&location)?;
    let document = Document::parse_str(&text, location)?;
    Ok(Compiler::new().with_retriever(retriever).compile(&[document])?)
}

#[cfg(feature = "cli")]
fn cmd_inspect(
    schema_path: PathBuf,
    type_name: Option<String>,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let model = load_schema(&schema_path)?;

    if let Some(name) = type_name {
        return print_type_details(&model, &name, json_output);
    }

    if json_output {
        print_schema_json(&model)
    } else {
        print_schema_summary(&model);
        Ok(())
    }
}

#[cfg(feature = "cli")]
fn label(model: &ComponentModel, id: ComponentId) -> &'static str {
    let ComponentId::Type(id) = id else { return "" };
    match model.effective_complex_type(id).map(|c| c.label) {
        None => "simple",
        Some(ContentTypeLabel::Empty) => "empty",
        Some(ContentTypeLabel::Simple) => "simple content",
        Some(ContentTypeLabel::ElementOnly) => "element-only",
        Some(ContentTypeLabel::Mixed) => "mixed",
    }
}

#[cfg(feature = "cli")]
fn print_schema_summary(model: &ComponentModel) {
    println!("xsdc v{}", xmlschema_compiler::VERSION);
    println!();
    println!("Statistics:");
    for (title, category) in [
        ("Global Elements", Category::Element),
        ("Global Types", Category::Type),
        ("Global Attributes", Category::Attribute),
        ("Model Groups", Category::Group),
        ("Attribute Groups", Category::AttributeGroup),
    ] {
        println!("  {}: {}", title, model.globals(category).len());
    }
    let report = model.report();
    println!("  Resolver Passes: {}", report.passes);
    println!("  Imports Loaded: {}", report.imports_loaded);

    println!("\n=== Global Elements ===");
    for (name, id) in model.globals(Category::Element) {
        if let ComponentId::Element(id) = id {
            println!("  {} : {}", name, model.type_name(model.element_type(id)));
        }
    }

    println!("\n=== Global Types ===");
    for (name, id) in model.globals(Category::Type) {
        let states = match id {
            ComponentId::Type(t) => model
                .content_model(t)
                .and_then(ContentModel::automaton)
                .map(|a| format!(", {} states", a.state_count()))
                .unwrap_or_default(),
            _ => String::new(),
        };
        println!("  {} ({}{})", name, label(model, id), states);
    }
}

#[cfg(feature = "cli")]
fn print_schema_json(model: &ComponentModel) -> Result<(), Box<dyn std::error::Error>> {
    use serde_json::{json, Value};

    let types: Vec<Value> = model
        .globals(Category::Type)
        .into_iter()
        .map(|(name, id)| {
            let content = match id {
                ComponentId::Type(t) => model.content_model(t).map(serde_json::to_value).transpose(),
                _ => Ok(None),
            };
            content.map(|content| {
                json!({
                    "name": name.to_string(),
                    "content": label(model, id),
                    "model": content,
                })
            })
        })
        .collect::<Result<_, _>>()?;
    let elements: Vec<Value> = model
        .globals(Category::Element)
        .into_iter()
        .filter_map(|(name, id)| match id {
            ComponentId::Element(e) => Some(json!({
                "name": name.to_string(),
                "type": model.type_name(model.element_type(e)),
                "abstract": model.element(e).is_abstract,
                "nillable": model.element(e).nillable,
            })),
            _ => None,
        })
        .collect();

    let output = json!({
        "resolution": model.report(),
        "elements": elements,
        "types": types,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(feature = "cli")]
fn print_type_details(model: &ComponentModel, name: &str, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let found = model
        .globals(Category::Type)
        .into_iter()
        .find(|(qname, _)| qname.local_name == name || qname.to_string() == name);
    let Some((qname, ComponentId::Type(id))) = found else {
        return Err(format!("Type '{}' not found in schema", name).into());
    };
    let content = model
        .content_model(id)
        .ok_or_else(|| format!("Type '{}' has no content model", name))?;

    if json_output {
        println!("{}", content.to_json()?);
        return Ok(());
    }

    println!("Type: {}", qname);
    let chain: Vec<String> = model
        .derivation_chain(id)
        .into_iter()
        .map(|t| model.type_name(t))
        .collect();
    println!("  Derivation: {}", chain.join(" -> "));
    if let Some(attributes) = model.attributes(id) {
        for (attr_name, attribute) in attributes {
            println!("  @{} ({}) : {}", attr_name, attribute.use_, model.type_name(attribute.type_id));
        }
    }
    match content {
        ContentModel::Empty => println!("  Content: empty"),
        ContentModel::Simple { value_type } => println!("  Content: simple ({})", model.type_name(*value_type)),
        ContentModel::Elements { automaton, mixed } => {
            println!(
                "  Content: {} automaton, {} states, {} transitions",
                if *mixed { "mixed" } else { "element-only" },
                automaton.state_count(),
                automaton.transition_count()
            );
            for (index, state) in automaton.states.iter().enumerate() {
                let marker = if state.accepting { "*" } else { " " };
                let start = if index == automaton.start { ">" } else { " " };
                println!("  {}{}{}", start, marker, index);
                for transition in &state.transitions {
                    println!(
                        "        {} -> {}",
                        automaton.alphabet[transition.symbol], transition.target
                    );
                }
            }
        }
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_validate(schema_path: PathBuf, file: PathBuf, mode: String) -> Result<(), Box<dyn std::error::Error>> {
    let model = load_schema(&schema_path)?;

    let validation_mode = match mode.to_lowercase().as_str() {
        "strict" => ValidationMode::Strict,
        "lazy" => ValidationMode::Lazy,
        _ => return Err(format!("Unknown validation mode: {}. Use: strict, lazy", mode).into()),
    };

    let location = Location::Path(file);
    let text = FileRetriever::new().load(&location)?;
    let document = Document::parse_str(&text, location)?;

    let errors: Vec<_> = match validation_mode {
        ValidationMode::Strict => model.validate_document(&document).err().into_iter().collect(),
        ValidationMode::Lazy => model.document_errors(&document),
    };

    if errors.is_empty() {
        println!("✓ Document is valid");
        Ok(())
    } else {
        println!("✗ Document is invalid");
        println!();
        println!("Errors:");
        for error in &errors {
            println!("  - {}", error);
        }
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
