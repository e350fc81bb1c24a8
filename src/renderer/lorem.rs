//! Placeholder text for `{% lorem %}`

use rand::seq::SliceRandom;
use rand::Rng;

use crate::parser::LoremMethod;

const COMMON_P: &str = "Lorem ipsum dolor sit amet, consectetur adipisicing elit, sed do eiusmod \
tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, quis nostrud \
exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat. Duis aute irure dolor in \
reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla pariatur. Excepteur sint \
occaecat cupidatat non proident, sunt in culpa qui officia deserunt mollit anim id est laborum.";

const COMMON_WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipisicing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua",
];

const WORDS: &[&str] = &[
    "exercitationem", "perferendis", "perspiciatis", "laborum", "eveniet", "sunt", "iure", "nam",
    "nobis", "eum", "cum", "officiis", "excepturi", "odio", "consectetur", "quasi", "aut", "quisquam",
    "vel", "eligendi", "itaque", "non", "odit", "tempore", "quaerat", "dignissimos", "facilis",
    "neque", "nihil", "expedita", "vitae", "vero", "ipsum", "nisi", "animi", "cumque", "pariatur",
    "velit", "modi", "natus", "iusto", "eaque", "sequi", "illo", "sed", "ex", "et", "voluptatibus",
    "tempora", "veritatis", "ratione", "assumenda", "incidunt", "nostrum", "placeat", "aliquid",
    "fuga", "provident", "praesentium", "rem", "necessitatibus", "suscipit", "adipisci", "quidem",
    "possimus", "voluptas", "debitis", "sint", "accusantium", "unde", "sapiente", "voluptate", "qui",
    "aspernatur", "laudantium", "soluta", "amet", "quo", "aliquam", "saepe", "culpa", "libero",
    "ipsa", "dicta", "reiciendis", "nesciunt", "doloribus", "autem", "impedit", "minima", "maiores",
    "repudiandae", "ipsam", "obcaecati", "ullam", "enim", "totam", "delectus", "ducimus", "quis",
    "voluptates", "dolores", "molestiae", "harum", "dolorem", "quia", "voluptatem", "molestias",
    "magni", "distinctio", "omnis", "illum", "dolorum", "voluptatum", "ea", "quas", "quam",
    "corporis", "quae", "blanditiis", "atque", "deserunt", "laboriosam", "earum", "consequuntur",
    "hic", "cupiditate", "quibusdam", "accusamus", "ut", "rerum", "error", "minus", "eius", "ab",
    "ad", "nemo", "fugit", "officia", "at", "in", "id", "quos", "reprehenderit", "numquam", "iste",
    "fugiat", "sit", "inventore", "beatae", "repellendus", "magnam", "recusandae", "quod", "explicabo",
    "doloremque", "aperiam", "consequatur", "asperiores", "commodi", "optio", "dolor", "labore",
    "temporibus", "repellat", "veniam", "architecto", "est", "esse", "mollitia", "nulla", "a",
    "similique", "eos", "alias", "dolore", "tenetur", "deleniti", "porro", "facere", "maxime",
    "corrupti",
];

/// Render `count` units of placeholder text
pub fn generate(count: usize, method: LoremMethod, random: bool) -> String {
    match method {
        LoremMethod::Words => words(count, random),
        LoremMethod::Paragraphs => paragraphs(count, random)
            .iter()
            .map(|p| format!("<p>{}</p>", p))
            .collect::<Vec<_>>()
            .join("\n\n"),
        LoremMethod::Blocks => paragraphs(count, random).join("\n\n"),
    }
}

/// Space-separated words; the common opening words come first unless `random`
pub fn words(count: usize, random: bool) -> String {
    if random {
        let mut rng = rand::thread_rng();
        return (0..count)
            .filter_map(|_| WORDS.choose(&mut rng).copied())
            .collect::<Vec<_>>()
            .join(" ");
    }
    COMMON_WORDS
        .iter()
        .chain(WORDS.iter())
        .cycle()
        .take(count)
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn paragraphs(count: usize, random: bool) -> Vec<String> {
    if !random {
        return vec![COMMON_P.to_string(); count];
    }
    let mut rng = rand::thread_rng();
    (0..count).map(|_| random_paragraph(&mut rng)).collect()
}

fn random_paragraph(rng: &mut impl Rng) -> String {
    let sentences = rng.gen_range(1..=4);
    (0..sentences)
        .map(|_| random_sentence(&mut *rng))
        .collect::<Vec<_>>()
        .join(" ")
}

fn random_sentence(rng: &mut impl Rng) -> String {
    let len = rng.gen_range(4..=12);
    let words: Vec<&str> = (0..len).filter_map(|_| WORDS.choose(&mut *rng).copied()).collect();
    let sentence = words.join(" ");
    let mut chars = sentence.chars();
    match chars.next() {
        Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}
