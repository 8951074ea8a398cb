use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is sitting the exam. Written once at login, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub display_name: String,
    pub roll: String,
}

/// In-progress exam work. Overwritten wholesale on every autosave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub current_question: u32,
    pub code: String,
    pub language: Language,
    pub seconds_remaining: u32,
}

/// The synthetic scoring output produced at submission. Never mutated
/// after creation; the analysis and leaderboard views only read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub display_name: String,
    pub roll: String,
    pub score: u8,
    pub speed: u8,
    pub efficiency: u8,
    pub completed_at: DateTime<Utc>,
}

impl ResultRecord {
    /// Rank formula carried over from the analysis view: lower scores
    /// push the rank down in steps of five points.
    pub fn rank(&self) -> u32 {
        std::cmp::max(1, (100 - u32::from(self.score)) / 5 + 1)
    }

    pub fn performance_level(&self) -> &'static str {
        match self.score {
            90.. => "Excellent",
            75..=89 => "Good",
            60..=74 => "Average",
            _ => "Needs Improvement",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    C,
    Cpp,
    Java,
    Javascript,
    Html,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::C,
        Language::Cpp,
        Language::Java,
        Language::Javascript,
        Language::Html,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Javascript => "javascript",
            Language::Html => "html",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Java => "Java",
            Language::Javascript => "JavaScript",
            Language::Html => "HTML",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Javascript => "js",
            Language::Html => "html",
        }
    }

    /// Starter code placed in the editor when the language is selected.
    pub fn template(&self) -> &'static str {
        match self {
            Language::Python => "# Write your Python code here\nprint(\"Hello World\")",
            Language::C => {
                "#include <stdio.h>\n\nint main() {\n    printf(\"Hello World\\n\");\n    return 0;\n}"
            }
            Language::Cpp => {
                "#include <iostream>\nusing namespace std;\n\nint main() {\n    cout << \"Hello World\" << endl;\n    return 0;\n}"
            }
            Language::Java => {
                "public class Main {\n    public static void main(String[] args) {\n        System.out.println(\"Hello World\");\n    }\n}"
            }
            Language::Javascript => {
                "// Write your JavaScript code here\nconsole.log(\"Hello World\");"
            }
            Language::Html => {
                "<!DOCTYPE html>\n<html>\n<head>\n    <title>Page Title</title>\n</head>\n<body>\n    <h1>Hello World</h1>\n</body>\n</html>"
            }
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Language::ALL.iter().copied().find(|l| l.tag() == tag)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: u32,
    pub title: &'static str,
    pub description: &'static str,
    pub difficulty: &'static str,
    pub points: u32,
}

/// The fixed question set shown during an exam attempt.
pub const EXAM_QUESTIONS: [Question; 3] = [
    Question {
        id: 1,
        title: "Array Sum Problem",
        description: "Write a function to find the sum of all elements in an array.",
        difficulty: "Easy",
        points: 10,
    },
    Question {
        id: 2,
        title: "Palindrome Checker",
        description: "Create a function that checks if a given string is a palindrome.",
        difficulty: "Medium",
        points: 15,
    },
    Question {
        id: 3,
        title: "Binary Search Implementation",
        description: "Implement binary search algorithm for a sorted array.",
        difficulty: "Hard",
        points: 20,
    },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub name: String,
    pub roll: String,
    pub score: u8,
    pub speed: u8,
    pub efficiency: u8,
    pub completed_at: DateTime<Utc>,
}
