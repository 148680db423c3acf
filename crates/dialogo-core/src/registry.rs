//! Static catalog of customer personas.
//!
//! The catalog is fixed at process start; sessions draw from it uniformly at
//! random. Baseline traits stay hidden from the trainee; the whole point of
//! the exercise is inferring them from behavior.

use crate::error::{CoreError, CoreResult};
use crate::types::{OceanTraits, Persona};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;

/// Immutable persona catalog with lookup and random selection.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
}

impl PersonaRegistry {
    /// Build a registry from an explicit persona list (e.g. for tests).
    pub fn new(personas: Vec<Persona>) -> Self {
        Self { personas }
    }

    /// The built-in catalog of Italian customer personas.
    pub fn builtin() -> Self {
        Self::new(builtin_personas())
    }

    pub fn all(&self) -> &[Persona] {
        &self.personas
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    /// Uniform random draw for a new session.
    pub fn pick_random(&self) -> CoreResult<&Persona> {
        self.personas
            .choose(&mut rand::thread_rng())
            .ok_or(CoreError::EmptyRegistry)
    }
}

/// Process-wide shared instance of the built-in catalog.
pub static BUILTIN_REGISTRY: Lazy<PersonaRegistry> = Lazy::new(PersonaRegistry::builtin);

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn builtin_personas() -> Vec<Persona> {
    vec![
        Persona {
            id: "analytical-alex".into(),
            name: "Alessandro Bianchi".into(),
            avatar: "AB".into(),
            description: "Un professionista metodico che vuole capire ogni dettaglio prima di decidere".into(),
            background: "Ingegnere informatico di 42 anni, sposato con due figli. Lavora come IT manager in una media azienda. È abituato ad analizzare dati e prendere decisioni basate su fatti concreti. Ha già un'assicurazione sanitaria base ma sta valutando un upgrade.".into(),
            traits: OceanTraits::new(0.75, 0.85, 0.35, 0.55, 0.45),
            behaviors: strings(&[
                "Chiede statistiche e dati concreti sulle coperture",
                "Vuole vedere confronti dettagliati tra i piani",
                "Prende appunti e fa domande specifiche",
                "Non decide mai al primo incontro",
                "Verifica ogni affermazione",
            ]),
            objections: strings(&[
                "Mi può mostrare i dati storici sui rimborsi?",
                "Quanto tempo ci vuole mediamente per l'approvazione di una pratica?",
                "C'è una tabella comparativa con altre polizze simili?",
            ]),
        },
        Persona {
            id: "friendly-fiona".into(),
            name: "Francesca Rossi".into(),
            avatar: "FR".into(),
            description: "Una persona socievole che dà molta importanza al rapporto umano".into(),
            background: "Titolare di un piccolo negozio di abbigliamento, 38 anni, single. Molto attiva nella comunità locale. Cerca una polizza sanitaria che la faccia sentire protetta e supportata. Le raccomandazioni di amici e familiari sono importanti per lei.".into(),
            traits: OceanTraits::new(0.55, 0.50, 0.85, 0.80, 0.30),
            behaviors: strings(&[
                "Racconta aneddoti personali durante la conversazione",
                "Chiede del servizio clienti e dell'assistenza",
                "Si interessa alla storia del consulente",
                "Decide anche in base alla simpatia",
                "Parla di esperienze di amici con assicurazioni",
            ]),
            objections: strings(&[
                "Un mio amico ha avuto problemi con i rimborsi, come funziona da voi?",
                "Se ho un problema, posso parlare sempre con la stessa persona?",
                "Mi racconti un po' di lei, da quanto fa questo lavoro?",
            ]),
        },
        Persona {
            id: "skeptical-sam".into(),
            name: "Salvatore Greco".into(),
            avatar: "SG".into(),
            description: "Un cliente diffidente che ha avuto esperienze negative in passato".into(),
            background: "Commercialista di 55 anni, divorziato. Ha avuto una brutta esperienza con un'assicurazione anni fa che non ha pagato un sinistro. È molto cauto e tende a vedere le fregature ovunque. Ha bisogno di una nuova polizza ma è riluttante.".into(),
            traits: OceanTraits::new(0.25, 0.80, 0.30, 0.25, 0.75),
            behaviors: strings(&[
                "Mette in discussione ogni affermazione",
                "Cita esperienze negative passate",
                "Chiede garanzie scritte",
                "Legge attentamente ogni clausola",
                "Esprime dubbi sulle promesse commerciali",
            ]),
            objections: strings(&[
                "Sì, ma poi quando serve davvero, pagate?",
                "Ho già sentito queste promesse, e poi...",
                "Dov'è scritto esattamente quello che mi sta dicendo?",
                "E se cambiate le condizioni dopo che ho firmato?",
            ]),
        },
        Persona {
            id: "decisive-dana".into(),
            name: "Daniela Martini".into(),
            avatar: "DM".into(),
            description: "Una manager impegnata che vuole decidere in fretta".into(),
            background: "Direttrice commerciale in una multinazionale, 45 anni, sempre di corsa. Non ha tempo da perdere e vuole soluzioni rapide ed efficienti. Disposta a pagare di più per un servizio premium che le faccia risparmiare tempo.".into(),
            traits: OceanTraits::new(0.55, 0.60, 0.75, 0.45, 0.35),
            behaviors: strings(&[
                "Va dritta al punto",
                "Interrompe le spiegazioni troppo lunghe",
                "Chiede il prezzo subito",
                "Vuole sapere i benefici principali in 30 secondi",
                "Può decidere anche al primo incontro se convinta",
            ]),
            objections: strings(&[
                "Mi faccia un riassunto in due minuti",
                "Qual è la differenza sostanziale rispetto alla concorrenza?",
                "Ok, quanto costa e cosa include? Andiamo al sodo",
            ]),
        },
        Persona {
            id: "cautious-carlo".into(),
            name: "Carlo Ferretti".into(),
            avatar: "CF".into(),
            description: "Un pensionato prudente che ha bisogno di rassicurazioni".into(),
            background: "Ex insegnante in pensione, 68 anni, vedovo. Vive con il figlio e la nuora. Ha qualche problema di salute e cerca una polizza che copra le sue esigenze specifiche. Ha paura di fare la scelta sbagliata e di pesare sulla famiglia.".into(),
            traits: OceanTraits::new(0.30, 0.70, 0.35, 0.75, 0.80),
            behaviors: strings(&[
                "Chiede spiegazioni multiple per lo stesso concetto",
                "Esprime preoccupazioni per la famiglia",
                "Ha bisogno di tempo per decidere",
                "Chiede se può parlarne con i figli",
                "Si preoccupa delle esclusioni e dei limiti",
            ]),
            objections: strings(&[
                "E se mi ammalo di qualcosa di grave, sono coperto?",
                "Posso farla vedere a mio figlio prima di firmare?",
                "Non vorrei fare una scelta sbagliata...",
                "Ci sono cose che non sono coperte? Me le può elencare?",
            ]),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_has_five_personas() {
        let registry = PersonaRegistry::builtin();
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn lookup_by_id() {
        let registry = PersonaRegistry::builtin();
        let persona = registry.get("skeptical-sam").unwrap();
        assert_eq!(persona.name, "Salvatore Greco");
        assert!(registry.get("nobody").is_none());
    }

    #[test]
    fn random_draw_comes_from_catalog() {
        let registry = PersonaRegistry::builtin();
        for _ in 0..20 {
            let persona = registry.pick_random().unwrap();
            assert!(registry.get(&persona.id).is_some());
        }
    }

    #[test]
    fn empty_registry_rejects_draw() {
        let registry = PersonaRegistry::new(Vec::new());
        assert!(matches!(
            registry.pick_random(),
            Err(CoreError::EmptyRegistry)
        ));
    }

    #[test]
    fn baseline_traits_stay_in_range() {
        for persona in PersonaRegistry::builtin().all() {
            for dim in crate::types::TraitDimension::ALL {
                let v = persona.traits.get(dim);
                assert!((0.0..=1.0).contains(&v), "{} {} out of range", persona.id, dim);
            }
        }
    }
}
