//! Prompt construction shared by every provider.
//!
//! The prompt is provider-neutral: it carries the listing and a strict
//! JSON answer contract. Only the image section changes depending on
//! whether the images travel as attachments or as plain URLs.

use crate::types::Listing;

/// At most this many image URLs are listed in text-only prompts.
const MAX_LISTED_IMAGE_URLS: usize = 5;

/// System prompt for chat-style APIs (OpenAI, Anthropic).
pub fn system_prompt() -> &'static str {
    "You are KleinValue Advisor, an expert marketplace appraiser. \
     Respond ONLY with JSON that matches the requested schema."
}

/// Build the appraisal prompt for a listing.
///
/// With `with_images` the model is told to inspect the attached photos;
/// without, the first image URLs are listed as context it cannot open.
pub fn build_prompt(listing: &Listing, with_images: bool) -> String {
    let mut prompt = String::with_capacity(1500 + listing.description.len());

    let sources = if with_images { ", and images" } else { " and image URLs" };
    prompt.push_str(&format!(
        "You are an expert appraiser for consumer goods on Kleinanzeigen. Use ALL provided \
         information (title, description, product specifications within the description if \
         present, location{sources}) to estimate a fair market value in Euros.\n\n"
    ));

    prompt.push_str(
        "Return ONLY a JSON object with this exact schema, no extra text, markdown, or explanations:\n\
         {\"value\": number, \"reasoning\": string, \"confidence\": number}\n\n",
    );

    prompt.push_str("Rules:\n");
    prompt.push_str(
        "- \"value\" must be a numeric Euro amount (can be decimal). Do NOT include currency \
         symbols or units in the JSON, only the number.\n",
    );
    prompt.push_str(
        "- \"confidence\" must be a number between 0-100 representing your confidence in the \
         estimate (0 = very uncertain, 100 = absolutely certain).\n",
    );
    if with_images {
        prompt.push_str(
            "- Base your estimate on description and product specs; analyze the provided images \
             for condition, quality, and features.\n",
        );
    } else {
        prompt.push_str(
            "- Base your estimate on description and product specs; you may treat image URLs as \
             additional context but you cannot fetch them.\n",
        );
    }
    prompt.push_str("- Keep \"reasoning\" concise (1-3 sentences).\n\n");

    let location = if listing.location.trim().is_empty() {
        "Unknown"
    } else {
        listing.location.as_str()
    };
    let description = if listing.description.trim().is_empty() {
        "No description available"
    } else {
        listing.description.as_str()
    };

    prompt.push_str("Item Data:\n");
    prompt.push_str(&format!("Title: {}\n", listing.title));
    prompt.push_str(&format!("Location: {location}\n"));
    prompt.push_str(&listed_price_line(listing.price));
    prompt.push('\n');
    prompt.push_str("Description (may include \"Product Specifications:\"):\n");
    prompt.push_str(description);
    prompt.push('\n');

    if with_images {
        prompt.push_str(
            "\nIMAGES ARE PROVIDED: Analyze the images to assess the item's condition, quality, \
             and features.\n\n\
             Consider when estimating value:\n\
             - Visual condition and quality from images\n\
             - Brand recognition visible in images\n\
             - Wear and tear visible in photos\n\
             - Overall appearance and presentation\n",
        );
    } else {
        prompt.push_str("\nImages (URLs):\n");
        prompt.push_str(&image_url_list(&listing.images));
        prompt.push_str(
            "\n\nConsider when estimating value:\n\
             - Condition based on text description\n\
             - Brand recognition from description\n",
        );
    }

    prompt
}

fn listed_price_line(price: Option<f64>) -> String {
    match price {
        Some(p) if p.is_finite() => format!("Listed Price: €{p}"),
        _ => "Listed Price: Unknown".to_string(),
    }
}

fn image_url_list(images: &[String]) -> String {
    if images.is_empty() {
        return "- None".to_string();
    }
    images
        .iter()
        .take(MAX_LISTED_IMAGE_URLS)
        .enumerate()
        .map(|(i, url)| format!("- {}. {url}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
