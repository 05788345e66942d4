//! Prompt sent to the text generator.

/// Build the instruction prompt for rewriting `title` into a question of at
/// most `max_chars` characters.
pub fn build_prompt(title: &str, max_chars: usize) -> String {
    format!(
        "Reescreva a manchete abaixo como uma pergunta de SIM ou NÃO, em português do Brasil, \
         com no máximo {max_chars} caracteres contando os espaços. \
         A pergunta deve convidar o leitor a opinar sobre o tema, por exemplo começando com \
         \"Você concorda\", \"Você conhece\" ou \"Você acha importante\". \
         Responda somente com a pergunta, terminando em \"?\", sem aspas e sem nenhuma \
         outra pontuação antes ou depois.\n\n\
         Manchete: {title}\n\n\
         Pergunta:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_budget_and_title() {
        let prompt = build_prompt("Câmara aprova orçamento de 2025", 96);
        assert!(prompt.contains("no máximo 96 caracteres"));
        assert!(prompt.contains("SIM ou NÃO"));
        assert!(prompt.contains("Manchete: Câmara aprova orçamento de 2025"));
        assert!(prompt.trim_end().ends_with("Pergunta:"));
    }
}
