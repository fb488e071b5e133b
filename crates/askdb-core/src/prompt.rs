//! Prompt text for the language model calls.

use crate::llm::GenerationRequest;

/// Column semantics for the default open-order view.
pub const DEFAULT_COLUMN_GUIDE: &str = "\
Customer fields: customer_no, name, city, customer_po_no, customer_type
Order fields: order_no, line_no, order_date, due_date, order_qty, balance_qty, balance_amount, pick_and_pack_qty, pegging, pick_list, ship_from, ship_via
Item fields: item_no, description, item_type, item_category, item_sub_category, unit_price
Sales fields: sales_rep_no, sales_rep_name
Other: internal_notes
Purchase order: po_no";

pub const INSIGHT_SYSTEM: &str = "\
You answer the user's question using ONLY the data found in the result rows.
Direct answer rule: if the question asks for a single winner (e.g. \"Which customer...?\"), answer in one standalone sentence instead of a list.

Formatting rules:
- If there are multiple rows (customers, orders, items), format them as a vertical list.
- Put a newline between every item. Never list them on the same line.
- Start each item with a bullet point (-) or a number.
- Example:
  - Customer A: 5 orders
  - Customer B: 3 orders
- If the result is a single fact, give one clear sentence.
- Do NOT mention \"SQL\", \"query\", or \"database\".";

pub const REWRITE_SYSTEM: &str = "Rewrite the user question into a clear, database-friendly question. Resolve vague references using the history.";

pub const CHAT_SYSTEM: &str = "You are a helpful ERP assistant. Use the chat history. Avoid SQL unless asked.";

/// System prompt for SQL generation against `view`.
pub fn sql_system(view: &str) -> String {
    format!(
        "You are a senior data analyst writing a SINGLE, safe SQLite query.

CRITICAL RULES:
- NEVER generate SQL placeholders (e.g. :param, $1, @name). ALWAYS inline literal values.
- ALWAYS produce fully executable SQL.
- Generate EXACTLY ONE statement starting with SELECT or WITH.
- NEVER modify data.
- Use the view {view}.
- Use explicit column names.
- Use ISO dates 'YYYY-MM-DD'.
- Use LIKE for text searches.
- Return ONLY the SQL statement. No markdown, no backticks."
    )
}

/// Two worked question/answer pairs.
pub fn few_shots(view: &str) -> String {
    [
        (
            "Top 5 customers by total order amount".to_string(),
            format!(
                "SELECT customer_no, name, SUM(balance_amount) AS total_amount FROM {view} GROUP BY customer_no, name ORDER BY total_amount DESC LIMIT 5"
            ),
        ),
        (
            "Show orders pending for Bangalore".to_string(),
            format!(
                "SELECT order_no, name, city, due_date FROM {view} WHERE city LIKE '%Bangalore%' AND balance_qty > 0 ORDER BY due_date ASC LIMIT 50"
            ),
        ),
    ]
    .iter()
    .map(|(q, a)| format!("Q: {q}\nA: {a}"))
    .collect::<Vec<_>>()
    .join("\n\n")
}

/// User message for SQL generation.
pub fn sql_user(req: &GenerationRequest<'_>) -> String {
    let mut msg = format!(
        "{shots}

Database view: {schema}
Column semantics:
{guide}
Conversation context: {history}
User question: {question}

Constraints:
- Use previous chat turns to resolve references.
- Add LIMIT {limit}.

Return ONLY the executable SQL statement:",
        shots = few_shots(req.view),
        schema = req.schema,
        guide = req.column_guide,
        history = req.history,
        question = req.question.trim(),
        limit = req.row_limit,
    );
    if let Some(item) = req.entity_hint {
        msg.push_str(&format!(
            "\n\nContext: the user previously referenced item '{item}'. \
             If the question is vague (e.g. 'this item'), filter with item_no LIKE '%{item}%'."
        ));
    }
    msg
}

pub fn insight_user(question: &str, sql: &str, rows_json: &str) -> String {
    format!("Question: {question}\nSQL: {sql}\nRows: {rows_json}\nInsight:")
}

pub fn rewrite_user(question: &str, history: &str, entity_hint: Option<&str>) -> String {
    let known = entity_hint
        .map(|item| format!("\nKnown entity: last_item = '{item}'"))
        .unwrap_or_default();
    format!("History:\n{history}\n\nQuestion:\n{question}\n{known}\n\nRewrite:")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(entity_hint: Option<&'a str>) -> GenerationRequest<'a> {
        GenerationRequest {
            question: "  show pending orders  ",
            schema: "v_open_order(item_no:TEXT)",
            view: "v_open_order",
            column_guide: DEFAULT_COLUMN_GUIDE,
            history: "",
            entity_hint,
            row_limit: 100,
        }
    }

    #[test]
    fn test_sql_user_prompt_contents() {
        let msg = sql_user(&request(None));
        assert!(msg.contains("User question: show pending orders\n"));
        assert!(msg.contains("Add LIMIT 100."));
        assert!(msg.contains("Q: Top 5 customers"));
        assert!(!msg.contains("previously referenced"));
    }

    #[test]
    fn test_sql_user_prompt_entity_hint() {
        let msg = sql_user(&request(Some("AB-123")));
        assert!(msg.contains("item_no LIKE '%AB-123%'"));
    }

    #[test]
    fn test_few_shots_use_the_view() {
        let shots = few_shots("erp_orders");
        assert_eq!(shots.matches("FROM erp_orders").count(), 2);
        assert!(!shots.contains("ILIKE"));
    }

    #[test]
    fn test_rewrite_prompt() {
        let with = rewrite_user("this item", "show AB-123 orders", Some("AB-123"));
        assert!(with.contains("last_item = 'AB-123'"));
        let without = rewrite_user("this item", "", None);
        assert!(!without.contains("Known entity"));
    }
}
