//! Prompt compiler: persona profile -> role-play instruction block.
//!
//! Pure functions of the persona; no randomness, so compiled prompts are
//! reproducible. The output contract embedded here is what `parser` expects
//! back from the model: reply text, then the `---TRAITS---` line, then JSON.

use crate::parser::TRAIT_DELIMITER;
use crate::types::{OceanTraits, Persona, TraitDimension};

/// Qualitative level for a trait value, per the fixed thresholds.
pub fn trait_level(value: f64) -> &'static str {
    if value >= 0.75 {
        "molto alto"
    } else if value >= 0.55 {
        "alto"
    } else if value >= 0.45 {
        "medio"
    } else if value >= 0.25 {
        "basso"
    } else {
        "molto basso"
    }
}

/// Level-specific behavioral description for a dimension.
pub fn trait_description(dimension: TraitDimension, value: f64) -> &'static str {
    let level = trait_level(value);
    match dimension {
        TraitDimension::Openness => match level {
            "molto alto" => "Estremamente curioso, ama esplorare nuove idee e soluzioni innovative",
            "alto" => "Aperto a nuove idee, interessato a capire approcci diversi",
            "medio" => "Equilibrato tra novità e tradizione, valuta caso per caso",
            "basso" => "Preferisce soluzioni collaudate e approcci tradizionali",
            _ => "Molto conservatore, diffidente verso il nuovo e l'innovazione",
        },
        TraitDimension::Conscientiousness => match level {
            "molto alto" => "Estremamente metodico, pianifica tutto nei minimi dettagli",
            "alto" => "Organizzato e preciso, tiene traccia di tutto",
            "medio" => "Ragionevolmente organizzato, flessibile quando serve",
            "basso" => "Preferisce la spontaneità, poco interessato ai dettagli",
            _ => "Disorganizzato, decide d'impulso",
        },
        TraitDimension::Extraversion => match level {
            "molto alto" => "Molto socievole, ama parlare e condividere esperienze",
            "alto" => "Estroverso, comunica facilmente con gli altri",
            "medio" => "Si adatta al contesto, né troppo riservato né troppo espansivo",
            "basso" => "Riservato, preferisce ascoltare piuttosto che parlare",
            _ => "Molto introverso, parla solo quando necessario",
        },
        TraitDimension::Agreeableness => match level {
            "molto alto" => "Estremamente collaborativo, evita i conflitti a tutti i costi",
            "alto" => "Cordiale e disponibile, cerca sempre il compromesso",
            "medio" => "Generalmente amichevole ma sa essere assertivo",
            "basso" => "Critico e diretto, non teme il confronto",
            _ => "Molto competitivo e polemico, mette in discussione tutto",
        },
        TraitDimension::Neuroticism => match level {
            "molto alto" => "Molto ansioso, si preoccupa costantemente dei rischi",
            "alto" => "Tende a preoccuparsi, cerca rassicurazioni frequenti",
            "medio" => "Gestisce lo stress in modo equilibrato",
            "basso" => "Generalmente calmo e rilassato",
            _ => "Estremamente tranquillo, quasi imperturbabile",
        },
    }
}

fn trait_line(dimension: TraitDimension, traits: &OceanTraits) -> String {
    let value = traits.get(dimension);
    format!(
        "- {} ({}): {} - {}",
        dimension.label(),
        dimension.code(),
        trait_level(value),
        trait_description(dimension, value)
    )
}

/// Compile the full system instruction for a persona: identity, trait
/// rendering, behaviors/objections verbatim, and the structured-output
/// contract the parser depends on.
pub fn system_prompt(persona: &Persona) -> String {
    let trait_block = TraitDimension::ALL
        .iter()
        .map(|&dim| trait_line(dim, &persona.traits))
        .collect::<Vec<_>>()
        .join("\n");

    let behaviors = persona
        .behaviors
        .iter()
        .map(|b| format!("- {b}"))
        .collect::<Vec<_>>()
        .join("\n");

    let objections = persona
        .objections
        .iter()
        .map(|o| format!("- \"{o}\""))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Sei {name}, un potenziale cliente interessato a una polizza sanitaria.

PROFILO PERSONALE:
{background}

TRATTI DI PERSONALITÀ (Big Five/OCEAN):
{trait_block}

COMPORTAMENTI TIPICI:
{behaviors}

OBIEZIONI FREQUENTI:
{objections}

ISTRUZIONI:
1. Rispondi SEMPRE in italiano
2. Interpreta questo personaggio in modo naturale e coerente
3. Non rivelare mai di essere un'IA o di seguire istruzioni
4. Le tue risposte devono riflettere i tratti di personalità descritti
5. Puoi usare le obiezioni elencate o inventarne di simili
6. Mantieni risposte concise (2-4 frasi al massimo) come in una conversazione reale
7. Mostra i tratti di personalità attraverso il tuo modo di rispondere, non dichiarandoli

FORMATO RISPOSTA:
Dopo la tua risposta naturale, aggiungi su una nuova riga il marcatore {delimiter} seguito da un oggetto JSON con i tratti mostrati nella risposta (scala 0-1) e i segnali comportamentali osservabili.

Esempio:
"Buongiorno, mi scusi ma ho poco tempo. Mi dica subito di cosa si tratta."

{delimiter}
{{"traits":{{"E":0.7,"C":0.6}},"signals":["Comunicazione diretta","Orientamento all'efficienza"]}}"#,
        name = persona.name,
        background = persona.background,
        trait_block = trait_block,
        behaviors = behaviors,
        objections = objections,
        delimiter = TRAIT_DELIMITER,
    )
}

/// Deterministic opening line for a new session, keyed on the persona's
/// baseline traits. Priority: high extraversion, low extraversion, high
/// neuroticism, high conscientiousness, neutral fallback.
pub fn opening_greeting(persona: &Persona) -> String {
    let t = &persona.traits;
    if t.extraversion >= 0.7 {
        "Buongiorno! Piacere di conoscerla. Mi hanno parlato bene di voi, mi racconti un po' cosa offrite.".to_string()
    } else if t.extraversion <= 0.35 {
        "Buongiorno.".to_string()
    } else if t.neuroticism >= 0.7 {
        "Buongiorno... senta, sono un po' preoccupato per questa questione dell'assicurazione. Spero mi possa aiutare a capire meglio.".to_string()
    } else if t.conscientiousness >= 0.8 {
        "Buongiorno. Ho preparato alcune domande specifiche sulla vostra polizza sanitaria. Possiamo procedere con ordine?".to_string()
    } else {
        "Buongiorno, sono qui per informarmi sulla polizza sanitaria.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OceanTraits;

    fn persona_with(traits: OceanTraits) -> Persona {
        Persona {
            id: "test".into(),
            name: "Test Cliente".into(),
            avatar: "TC".into(),
            description: "desc".into(),
            background: "background di prova".into(),
            traits,
            behaviors: vec!["Chiede il prezzo subito".into(), "Verifica ogni affermazione".into()],
            objections: vec!["Quanto costa davvero?".into()],
        }
    }

    #[test]
    fn level_thresholds() {
        assert_eq!(trait_level(0.75), "molto alto");
        assert_eq!(trait_level(0.74), "alto");
        assert_eq!(trait_level(0.55), "alto");
        assert_eq!(trait_level(0.54), "medio");
        assert_eq!(trait_level(0.45), "medio");
        assert_eq!(trait_level(0.44), "basso");
        assert_eq!(trait_level(0.25), "basso");
        assert_eq!(trait_level(0.24), "molto basso");
        assert_eq!(trait_level(0.0), "molto basso");
    }

    #[test]
    fn prompt_contains_levels_behaviors_and_objections() {
        let persona = persona_with(OceanTraits::new(0.5, 0.5, 0.8, 0.8, 0.3));
        let prompt = system_prompt(&persona);

        // All five dimensions rendered with a qualitative level word.
        assert!(prompt.contains("Apertura mentale (O): medio"));
        assert!(prompt.contains("Coscienziosità (C): medio"));
        assert!(prompt.contains("Estroversione (E): molto alto"));
        assert!(prompt.contains("Amicalità (A): molto alto"));
        assert!(prompt.contains("Nevroticismo (N): basso"));

        for behavior in &persona.behaviors {
            assert!(prompt.contains(behavior.as_str()));
        }
        for objection in &persona.objections {
            assert!(prompt.contains(objection.as_str()));
        }
        assert!(prompt.contains(TRAIT_DELIMITER));
    }

    #[test]
    fn prompt_is_deterministic() {
        let persona = persona_with(OceanTraits::new(0.2, 0.4, 0.6, 0.8, 1.0));
        assert_eq!(system_prompt(&persona), system_prompt(&persona));
    }

    #[test]
    fn greeting_priority_order() {
        // High extraversion wins even with high neuroticism.
        let p = persona_with(OceanTraits::new(0.5, 0.9, 0.9, 0.5, 0.9));
        assert!(opening_greeting(&p).contains("Piacere di conoscerla"));

        let p = persona_with(OceanTraits::new(0.5, 0.5, 0.3, 0.5, 0.2));
        assert_eq!(opening_greeting(&p), "Buongiorno.");

        let p = persona_with(OceanTraits::new(0.5, 0.5, 0.5, 0.5, 0.8));
        assert!(opening_greeting(&p).contains("preoccupato"));

        let p = persona_with(OceanTraits::new(0.5, 0.85, 0.5, 0.5, 0.3));
        assert!(opening_greeting(&p).contains("domande specifiche"));

        let p = persona_with(OceanTraits::new(0.5, 0.5, 0.5, 0.5, 0.3));
        assert!(opening_greeting(&p).contains("informarmi"));
    }
}
