pub const DB_PRIMER: &str = "You will be helping users query a MySQL database. \
Remember to ALWAYS generate SQL queries for any data-related questions, \
use HTML formatting for readable responses, and provide concise analysis of results.";

pub const FILE_PRIMER: &str = "You will be helping users analyze and understand Excel and CSV files. \
Focus on extracting insights, explaining patterns, and providing clear explanations of the data.";

pub const PROCESSING_ERROR: &str =
    "<p><b>Error:</b> There was a problem processing your request. Please try again.</p>";

pub const FILE_ANALYSIS_ERROR: &str =
    "<p><b>Error:</b> There was a problem analyzing the file. Please try again.</p>";

/// Words that mark a question as being about stored data.
pub const DATA_KEYWORDS: [&str; 17] = [
    "how many", "list", "show", "find", "get", "users", "count", "database", "data", "records",
    "total", "search", "query", "lookup", "fetch", "retrieve", "display",
];

const FORMATTING_RULES: &str = "RESPONSE FORMATTING INSTRUCTIONS:
- Use HTML formatting in your responses for better readability in the web interface
- Use <strong> or <b> tags for emphasis and important information
- Use <ul> and <li> tags for lists
- Use <p> tags for paragraphs
- Include a concise summary at the beginning of your analysis
- Use appropriate headings with <h4> tags for different sections";

/// Per-database query rules folded into the system instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRules {
    pub database: String,
    pub attendance_project: Option<String>,
}

impl TenantRules {
    fn render(&self) -> String {
        let mut rules = format!(
            "DATABASE-SPECIFIC RULES (current database: {}):\n\
             - For text matching ALWAYS use LIKE with wildcards, for example WHERE NameEn LIKE '%term%', \
             never exact equality on names or descriptions\n\
             - Exclude soft-deleted rows with IsDeleted = 0 unless the user asks for deleted records",
            self.database
        );

        if let Some(project) = &self.attendance_project {
            rules.push_str(&format!(
                "\n- Every query that reads EmployeeAttendances MUST filter on ProjectId = {project}"
            ));
        }

        rules
    }
}

pub fn db_system_instruction(context: &str, rules: &TenantRules) -> String {
    format!(
        "You are a helpful AI assistant that specializes in database interactions using MySQL.
You're providing assistance through a web application that allows users to query the database.

CRITICAL INSTRUCTION: When the user asks ANY question about data, users, records, or information
that would be stored in a database, you MUST ALWAYS generate an SQL query to retrieve that information.
DO NOT say that you cannot query the database - you CAN and SHOULD generate SQL queries for any data-related question.

You have access to the following schema information that defines the application's data structure:
{context}

When asked about ANY data that might be in the database, ALWAYS:
1. Generate an appropriate SQL query to answer the question
2. Format the SQL query in a code block with ```sql tags
3. The query will be executed automatically and results will be provided to you
4. Then analyze the results and provide a clear, concise answer
5. Keep in mind table names in the database should match the schema above

{rules}

{FORMATTING_RULES}
- When presenting numerical results, consider using phrases like \"There are X records\" or \"Found X matches\"
- Keep your responses concise and focused",
        rules = rules.render(),
    )
}

pub fn file_system_instruction() -> String {
    format!(
        "You are a helpful AI assistant that specializes in analyzing and explaining data from Excel and CSV files.

Focus on:
1. Understanding data patterns and trends
2. Providing clear statistical insights
3. Explaining relationships between variables
4. Helping users understand their data through clear explanations
5. Suggesting visualizations that would be appropriate for the data

When analyzing data, always:
1. Start with an overview of what you see in the data
2. Point out any interesting patterns, outliers, or anomalies
3. Suggest possible interpretations or conclusions
4. Answer the user's specific questions about their data
5. When appropriate, suggest further analyses that could provide more insights

{FORMATTING_RULES}

Remember: You are analyzing a file, NOT querying a database. Do not generate SQL code."
    )
}

const ANALYSIS_REQUEST: &str = "Use HTML formatting for better readability, including <b> tags for important information, \
<ul> and <li> for lists, and <h4> for section headings. Start with a brief summary.";

pub fn interpret_direct(sql: &str, result: &str) -> String {
    format!(
        "The SQL query '{sql}' returned the following results:\n\n{result}\n\n\
         Please analyze these results and provide a concise interpretation. {ANALYSIS_REQUEST}"
    )
}

pub fn interpret(result: &str) -> String {
    format!(
        "The SQL query returned the following results:\n\n{result}\n\n\
         Please analyze these results and provide a concise, meaningful interpretation. {ANALYSIS_REQUEST}"
    )
}

pub fn suggest_alternative(error: &str) -> String {
    format!(
        "The SQL query failed with error: {error}\n\n\
         Please suggest an alternative query or explain what might be wrong. \
         Format your response with HTML tags for better readability."
    )
}

pub fn request_sql(message: &str) -> String {
    format!(
        "The user's question appears to be about data in the database. \
         Please generate an SQL query to answer this question: '{message}'. \
         Format the query in a code block with ```sql tags. \
         If you're absolutely certain this doesn't require database access, explain why."
    )
}

pub fn analyze_upload(file_info: &str) -> String {
    format!(
        "The user has uploaded a file. Here is information about the file:\n\n{file_info}\n\n\
         Please analyze this data and provide insights. \
         Focus on helping the user understand patterns, insights, and statistics from this data."
    )
}

pub fn is_data_question(message: &str) -> bool {
    let lower = message.to_lowercase();
    DATA_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_filter_rule_only_for_filtered_databases() {
        let filtered = TenantRules {
            database: "pa".into(),
            attendance_project: Some("64".into()),
        };
        let open = TenantRules {
            database: "biovision".into(),
            attendance_project: None,
        };

        let text = db_system_instruction("Table: Sites", &filtered);
        assert!(text.contains("Table: Sites"));
        assert!(text.contains("ProjectId = 64"));
        assert!(text.contains("LIKE '%term%'"));

        let text = db_system_instruction("Table: Sites", &open);
        assert!(!text.contains("ProjectId = 64"));
        assert!(text.contains("LIKE '%term%'"));
    }

    #[test]
    fn data_questions_are_detected_by_keyword() {
        assert!(is_data_question("How many employees joined?"));
        assert!(is_data_question("Display the sites"));
        assert!(!is_data_question("Hello there"));
    }

    #[test]
    fn file_instruction_forbids_sql() {
        assert!(file_system_instruction().ends_with("Do not generate SQL code."));
    }
}
