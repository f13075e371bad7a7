//! Assembles a company's knowledge records into the single text block the
//! generative backend consumes. Pure function of its input: identical input
//! yields byte-identical output, and absent data degrades to an explicit
//! placeholder so the backend always sees the same section structure.

use crate::domain::knowledge::{CompanyKnowledge, Product, Service};

const PLACEHOLDER: &str = "Not provided.";

pub fn build_context(knowledge: &CompanyKnowledge) -> String {
    let mut output = String::new();

    push_section(&mut output, "Company Information", |body| {
        match (&knowledge.company_name, &knowledge.description) {
            (None, None) => body.push_str(PLACEHOLDER),
            (name, description) => {
                if let Some(name) = name {
                    body.push_str("Name: ");
                    body.push_str(name);
                    body.push('\n');
                }
                body.push_str(description.as_deref().unwrap_or(PLACEHOLDER));
            }
        }
    });

    push_section(&mut output, "Products", |body| {
        if knowledge.products.is_empty() {
            body.push_str(PLACEHOLDER);
            return;
        }
        for (index, product) in knowledge.products.iter().enumerate() {
            if index > 0 {
                body.push('\n');
            }
            push_product(body, product);
        }
    });

    push_section(&mut output, "Services", |body| {
        if knowledge.services.is_empty() {
            body.push_str(PLACEHOLDER);
            return;
        }
        for (index, service) in knowledge.services.iter().enumerate() {
            if index > 0 {
                body.push('\n');
            }
            push_service(body, service);
        }
    });

    push_section(&mut output, "Sales Instructions", |body| {
        body.push_str(knowledge.sales_instructions.as_deref().unwrap_or(PLACEHOLDER));
    });

    output
}

fn push_section<F>(output: &mut String, header: &str, fill: F)
where
    F: FnOnce(&mut String),
{
    if !output.is_empty() {
        output.push('\n');
    }
    output.push_str("## ");
    output.push_str(header);
    output.push('\n');
    fill(output);
    output.push('\n');
}

fn push_product(body: &mut String, product: &Product) {
    body.push_str("- ");
    body.push_str(&product.name);
    match &product.price {
        Some(price) => {
            body.push_str(" ($");
            body.push_str(&price.to_string());
            body.push(')');
        }
        None => body.push_str(" (price not provided)"),
    }
    body.push_str(": ");
    body.push_str(product.description.as_deref().unwrap_or(PLACEHOLDER));
    if !product.features.is_empty() {
        body.push_str(" Features: ");
        body.push_str(&product.features.join(", "));
        body.push('.');
    }
}

fn push_service(body: &mut String, service: &Service) {
    body.push_str("- ");
    body.push_str(&service.name);
    match &service.price {
        Some(price) => {
            body.push_str(" ($");
            body.push_str(&price.to_string());
            body.push(')');
        }
        None => body.push_str(" (price not provided)"),
    }
    body.push_str(": ");
    body.push_str(service.description.as_deref().unwrap_or(PLACEHOLDER));
    if !service.benefits.is_empty() {
        body.push_str(" Benefits: ");
        body.push_str(&service.benefits.join(", "));
        body.push('.');
    }
}
