use osim_common::RandomSource;

const HEADER: &str = "Automatically generated file contents\n\n";
const WORDS: [&str; 8] = [
    "process", "memory", "data", "system", "file", "cluster", "page", "frame",
];
const WORDS_PER_UNIT: u32 = 10;

/// Placeholder text: `demanded_size * 10` words, ten per line.
pub fn generate(demanded_size: u32, rng: &mut dyn RandomSource) -> String {
    let mut content = String::from(HEADER);

    for i in 0..demanded_size * WORDS_PER_UNIT {
        let word = WORDS[rng.range(0, WORDS.len() as u32 - 1) as usize];
        content.push_str(word);
        content.push(' ');
        if i % WORDS_PER_UNIT == WORDS_PER_UNIT - 1 {
            content.push('\n');
        }
    }

    content
}
